use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use vigil_core::MetricPoint;

use crate::health::{matching, mean_value};
use crate::stats;

const VARIABILITY_RATIO: f64 = 0.5;
const MIN_MONITORING_POINTS: usize = 100;
const ERROR_RATE_LIMIT: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelsStatus {
    pub trained_models: usize,
    pub anomaly_detectors: usize,
    pub total_metrics_analyzed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightSummary {
    pub models_status: ModelsStatus,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_assessment: RiskAssessment,
    pub generated_at: DateTime<Utc>,
}

/// Cross-source summary of the last day of observations.
#[derive(Debug, Clone)]
pub struct InsightReporter {
    window: Duration,
}

impl Default for InsightReporter {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
        }
    }
}

impl InsightReporter {
    /// Never fails; an empty store yields an empty low-risk summary.
    pub fn summarize(&self, points: &[MetricPoint], status: ModelsStatus, now: DateTime<Utc>) -> InsightSummary {
        let mut summary = InsightSummary {
            models_status: status,
            key_findings: Vec::new(),
            recommendations: Vec::new(),
            risk_assessment: RiskAssessment {
                overall_risk: RiskLevel::Low,
                risk_factors: Vec::new(),
            },
            generated_at: now,
        };
        if points.is_empty() {
            return summary;
        }

        let cutoff = now - self.window;
        let recent: Vec<&MetricPoint> = points.iter().filter(|p| p.timestamp >= cutoff).collect();

        let mut by_source: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for p in &recent {
            by_source.entry(p.source.as_str()).or_default().push(p.value);
        }
        for (source, values) in &by_source {
            // Sample std is undefined for a single value.
            if values.len() < 2 {
                continue;
            }
            let std = stats::sample_stddev(values);
            if std > stats::mean(values) * VARIABILITY_RATIO {
                summary
                    .key_findings
                    .push(format!("{source} shows high performance variability (std: {std:.2})"));
                summary
                    .recommendations
                    .push(format!("Investigate {source} for potential instability"));
            }
        }

        let risk = &mut summary.risk_assessment;
        if recent.len() < MIN_MONITORING_POINTS {
            risk.risk_factors.push("Insufficient monitoring data".to_string());
        }
        let errors = matching(&recent, &["error"]);
        if !errors.is_empty() && mean_value(&errors) > ERROR_RATE_LIMIT {
            risk.risk_factors.push("Elevated error rates detected".to_string());
            risk.overall_risk = RiskLevel::Medium;
        }

        summary
    }
}
