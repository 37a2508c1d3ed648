use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    /// Malformed point or out-of-range parameter. Rejected before any state changes.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown series or source.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model exists but is untrained, or not enough recent data.
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Training failed for {series}: {reason}")]
    TrainingFailure { series: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl VigilError {
    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VigilError::InvalidInput(_) => "invalid_input",
            VigilError::NotFound(_) => "not_found",
            VigilError::NotReady(_) => "not_ready",
            VigilError::TrainingFailure { .. } => "training_failure",
            VigilError::Config(_) => "config",
            VigilError::Internal(_) => "internal",
        }
    }

    pub fn training(series: impl ToString, reason: impl Into<String>) -> Self {
        VigilError::TrainingFailure {
            series: series.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
