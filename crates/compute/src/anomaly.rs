use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vigil_core::{MetricPoint, SeriesKey, VigilError};

use crate::algorithms::{IsolationForest, IsolationParams, StandardScaler};
use crate::features::{sorted_by_time, FeatureBuilder};

/// Raw points the anomaly model needs to fit.
pub const MIN_ANOMALY_POINTS: usize = 10;

/// Reported threshold; fixed and not re-estimated during training.
pub const DEFAULT_THRESHOLD: f64 = -0.5;

const HIGH_SEVERITY_BELOW: f64 = -0.8;
const MEDIUM_SEVERITY_BELOW: f64 = -0.5;

/// Severity shared by anomaly events and health issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Map an outlier's decision score to a severity bucket.
pub fn classify_severity(score: f64) -> Severity {
    if score < HIGH_SEVERITY_BELOW {
        Severity::High
    } else if score < MEDIUM_SEVERITY_BELOW {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEvent {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub anomaly_score: f64,
    pub severity: Severity,
}

/// Outcome of scoring one slice.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub events: Vec<AnomalyEvent>,
    /// Feature rows scored (one fewer than the points supplied).
    pub evaluated: usize,
    pub anomaly_ratio: f64,
}

impl AnomalyReport {
    fn empty() -> Self {
        Self {
            events: Vec::new(),
            evaluated: 0,
            anomaly_ratio: 0.0,
        }
    }
}

/// Per-row detector output before events are built.
#[derive(Debug, Clone, Copy)]
pub struct ScoredRow {
    pub score: f64,
    pub is_outlier: bool,
}

/// Build events from scored rows. Row `i` describes point `i + 1` of the
/// time-sorted slice; non-outlier rows are dropped.
pub fn collect_events(sorted: &[&MetricPoint], rows: &[ScoredRow]) -> Vec<AnomalyEvent> {
    rows.iter()
        .enumerate()
        .filter(|(_, r)| r.is_outlier)
        .filter_map(|(i, r)| {
            sorted.get(i + 1).map(|p| AnomalyEvent {
                timestamp: p.timestamp,
                value: p.value,
                anomaly_score: r.score,
                severity: classify_severity(r.score),
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct FittedDetector {
    scaler: StandardScaler,
    forest: IsolationForest,
}

/// Per-series outlier detector over value, rate of change and calendar features.
#[derive(Debug, Clone)]
pub struct AnomalyModel {
    key: SeriesKey,
    features: FeatureBuilder,
    params: IsolationParams,
    min_points: usize,
    threshold: f64,
    fitted: Option<FittedDetector>,
    trained_at: Option<DateTime<Utc>>,
}

impl AnomalyModel {
    pub fn new(key: SeriesKey) -> Self {
        Self::with_settings(key, MIN_ANOMALY_POINTS, IsolationParams::default())
    }

    pub fn with_settings(key: SeriesKey, min_points: usize, params: IsolationParams) -> Self {
        Self {
            key,
            features: FeatureBuilder::default(),
            params,
            min_points,
            threshold: DEFAULT_THRESHOLD,
            fitted: None,
            trained_at: None,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    pub fn train(&mut self, slice: &[MetricPoint]) -> Result<(), VigilError> {
        if slice.len() < self.min_points {
            return Err(VigilError::training(
                &self.key,
                format!("need at least {} points, got {}", self.min_points, slice.len()),
            ));
        }
        let rows = self.features.anomaly_features(slice);
        if rows.is_empty() {
            return Err(VigilError::training(&self.key, "no anomaly feature rows"));
        }

        let fit_err = |e: VigilError| VigilError::training(&self.key, e.to_string());
        let scaler = StandardScaler::fit(&rows).map_err(fit_err)?;
        let forest = IsolationForest::fit(&scaler.transform_all(&rows), &self.params).map_err(fit_err)?;

        self.fitted = Some(FittedDetector { scaler, forest });
        self.trained_at = Some(Utc::now());
        info!(series = %self.key, rows = rows.len(), "anomaly detector trained");
        Ok(())
    }

    pub fn detect(&self, slice: &[MetricPoint]) -> Result<AnomalyReport, VigilError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| {
            VigilError::NotReady(format!("anomaly detector for {} is not trained", self.key))
        })?;

        let rows = self.features.anomaly_features(slice);
        if rows.is_empty() {
            return Ok(AnomalyReport::empty());
        }

        let scored: Vec<ScoredRow> = rows
            .iter()
            .map(|r| {
                let scaled = fitted.scaler.transform(r);
                let score = fitted.forest.decision_function(&scaled);
                ScoredRow {
                    score,
                    is_outlier: score < 0.0,
                }
            })
            .collect();

        let sorted = sorted_by_time(slice);
        let events = collect_events(&sorted, &scored);
        let anomaly_ratio = events.len() as f64 / scored.len() as f64;

        debug!(
            series = %self.key,
            evaluated = scored.len(),
            anomalies = events.len(),
            "anomaly scan complete"
        );
        Ok(AnomalyReport {
            events,
            evaluated: scored.len(),
            anomaly_ratio,
        })
    }
}
