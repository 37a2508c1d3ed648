//! Forecast, anomaly and capacity endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use vigil_compute::{
    AnomalyRequest, AnomalyResponse, CapacityPlan, CapacityRequest, ForecastRequest, ForecastResponse,
};

use crate::error::{ApiError, ApiJson};
use crate::state::AppState;

pub async fn predict(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ForecastRequest>,
) -> Result<Json<ForecastResponse>, ApiError> {
    Ok(Json(state.engine.forecast(req)?))
}

pub async fn detect_anomalies(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<AnomalyRequest>,
) -> Result<Json<AnomalyResponse>, ApiError> {
    Ok(Json(state.engine.detect_anomalies(req)?))
}

pub async fn capacity_plan(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CapacityRequest>,
) -> Result<Json<CapacityPlan>, ApiError> {
    Ok(Json(state.engine.capacity(req)?))
}
