//! Metric analytics engine: bounded metric storage, per-series forecasting
//! and anomaly models, background training and derived health signals.

use std::sync::PoisonError;

use vigil_core::VigilError;

pub mod algorithms;
pub mod anomaly;
pub mod capacity;
pub mod engine;
pub mod features;
pub mod forecast;
pub mod health;
pub mod insights;
pub mod registry;
pub mod stats;
pub mod store;
pub mod training;

pub use anomaly::{AnomalyEvent, AnomalyModel, AnomalyReport, Severity};
pub use capacity::{CapacityPlan, CapacityProjector};
pub use engine::{
    AnalyticsEngine, AnomalyRequest, AnomalyResponse, CapacityRequest, EngineStatus, ForecastRequest,
    ForecastResponse, IngestAck,
};
pub use features::FeatureBuilder;
pub use forecast::{Forecast, ForecastModel};
pub use health::{HealthScorer, HealthSignal};
pub use insights::{InsightReporter, InsightSummary};
pub use registry::{ModelRegistry, ModelSettings, ModelStatus, SharedModelRegistry, TrainingSummary};
pub use store::{MetricQuery, MetricStore, SharedMetricStore};
pub use training::{Trainer, TrainingAck, TrainingMetrics, TrainingStatus};

/// Map a poisoned lock into an internal error naming the guarded state.
pub(crate) fn poisoned<T>(what: &'static str) -> impl FnOnce(PoisonError<T>) -> VigilError {
    move |e| VigilError::Internal(format!("{what} lock poisoned: {e}"))
}
