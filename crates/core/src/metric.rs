use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VigilError;

/// A single timestamped observation reported by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    /// Owner of the series, typically a service name.
    pub source: String,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl MetricPoint {
    pub fn new(
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            source: source.into(),
            metric_name: metric_name.into(),
            value,
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Identity of the series this point belongs to.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(&self.source, &self.metric_name)
    }

    /// Reject points that must never reach the store.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.source.trim().is_empty() {
            return Err(VigilError::InvalidInput("metric point has an empty source".into()));
        }
        if self.metric_name.trim().is_empty() {
            return Err(VigilError::InvalidInput(format!(
                "metric point from '{}' has an empty metric_name",
                self.source
            )));
        }
        if !self.value.is_finite() {
            return Err(VigilError::InvalidInput(format!(
                "metric point {}/{} has a non-finite value",
                self.source, self.metric_name
            )));
        }
        Ok(())
    }
}

/// (source, metric_name) pair identifying one logical time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub source: String,
    pub metric_name: String,
}

impl SeriesKey {
    pub fn new(source: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            metric_name: metric_name.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.metric_name)
    }
}
