//! HTTP router construction.
//!
//! Assembles all Axum routes and middleware into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// `*` allows any origin; anything else must be a single valid origin.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS origin, allowing any");
            CorsLayer::permissive()
        }
    }
}

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    Router::new()
        .route("/health", get(api::health))
        .route("/health/predict", get(api::health_predict))
        .route("/metrics/ingest", post(api::ingest_metrics))
        .route("/models", get(api::models_list))
        .route("/models/train", post(api::train_models))
        .route("/models/metrics", get(api::models_metrics))
        .route("/predict", post(api::predict))
        .route("/anomalies/detect", post(api::detect_anomalies))
        .route("/capacity/plan", post(api::capacity_plan))
        .route("/insights/summary", get(api::insights_summary))
        .route("/config", get(api::config))
        .layer(cors)
        .with_state(state)
}
