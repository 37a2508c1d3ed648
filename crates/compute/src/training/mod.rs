//! Background model training.
//!
//! [`Trainer`] runs a training pass over a snapshot of the metric store
//! without holding the registry lock while models are fitted. Each series is
//! fitted on the blocking pool under a time budget, and [`TrainingMetrics`]
//! keeps the results for the API.

pub mod metrics;
pub mod trainer;

pub use metrics::TrainingMetrics;
pub use trainer::{SharedTrainingMetrics, Trainer, TrainingAck, TrainingStatus};
