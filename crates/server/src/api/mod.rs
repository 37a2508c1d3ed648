//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area. Handlers are thin:
//! they deserialize, call one [`AnalyticsEngine`](vigil_compute::AnalyticsEngine)
//! operation and serialize the result or an [`ApiError`](crate::error::ApiError).

mod analysis;
mod health;
mod ingest;
mod models;

// ── Re-exports ───────────────────────────────────────────────────
// Flat `api::foo` paths used by router.rs.

pub use analysis::{capacity_plan, detect_anomalies, predict};
pub use health::{config, health, health_predict, insights_summary};
pub use ingest::ingest_metrics;
pub use models::{models_list, models_metrics, train_models};
