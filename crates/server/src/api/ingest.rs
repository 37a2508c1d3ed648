use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use vigil_compute::IngestAck;
use vigil_core::MetricPoint;

use crate::error::{ApiError, ApiJson};
use crate::state::AppState;

/// Append a batch of points. The whole batch is rejected if any point is malformed.
pub async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    ApiJson(points): ApiJson<Vec<MetricPoint>>,
) -> Result<Json<IngestAck>, ApiError> {
    Ok(Json(state.engine.ingest(points)?))
}
