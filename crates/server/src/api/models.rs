//! Model training and registry endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use vigil_compute::{ModelStatus, TrainingAck, TrainingMetrics};

use crate::error::ApiError;
use crate::state::AppState;

/// Start a background training pass and return immediately.
pub async fn train_models(State(state): State<Arc<AppState>>) -> (StatusCode, Json<TrainingAck>) {
    (StatusCode::ACCEPTED, Json(state.engine.trigger_training()))
}

pub async fn models_metrics(State(state): State<Arc<AppState>>) -> Result<Json<TrainingMetrics>, ApiError> {
    Ok(Json(state.engine.training_metrics()?))
}

pub async fn models_list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ModelStatus>>, ApiError> {
    Ok(Json(state.engine.models()?))
}
