//! Service status and derived-signal endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use vigil_compute::{EngineStatus, HealthSignal, InsightSummary};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<EngineStatus>, ApiError> {
    Ok(Json(state.engine.status()?))
}

pub async fn health_predict(State(state): State<Arc<AppState>>) -> Result<Json<HealthSignal>, ApiError> {
    Ok(Json(state.engine.health()?))
}

pub async fn insights_summary(State(state): State<Arc<AppState>>) -> Result<Json<InsightSummary>, ApiError> {
    Ok(Json(state.engine.insights()?))
}

/// Active configuration with nothing sensitive in it.
pub async fn config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.config.redacted_summary())
}
