use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use vigil_core::{MetricPoint, VigilError};

use crate::anomaly::Severity;
use crate::stats;

/// Minutes ahead the health signal claims to describe.
pub const PREDICTION_HORIZON_MINUTES: u32 = 60;

const ERROR_RATE_LIMIT: f64 = 0.05;
const LATENCY_LIMIT_MS: f64 = 500.0;
const CPU_LIMIT_PERCENT: f64 = 70.0;
/// Category count at which confidence saturates.
const CONFIDENCE_CATEGORIES: f64 = 5.0;

#[derive(Debug, Clone, Serialize)]
pub struct HealthIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    pub affected_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSignal {
    pub overall_score: f64,
    pub issues: Vec<HealthIssue>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub prediction_horizon_minutes: u32,
    pub generated_at: DateTime<Utc>,
}

/// Heuristic system health from recent raw observations.
///
/// Three categories are recognized by case-insensitive substring of the
/// metric name: error rates, latency (`duration` or `latency`) and cpu.
/// Each present category contributes a score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct HealthScorer {
    window: Duration,
}

impl Default for HealthScorer {
    fn default() -> Self {
        Self {
            window: Duration::hours(1),
        }
    }
}

impl HealthScorer {
    pub fn score(&self, points: &[MetricPoint], now: DateTime<Utc>) -> Result<HealthSignal, VigilError> {
        if points.is_empty() {
            return Err(VigilError::NotReady("no metrics data available".into()));
        }

        let cutoff = now - self.window;
        let recent: Vec<&MetricPoint> = points.iter().filter(|p| p.timestamp >= cutoff).collect();

        let mut scores = Vec::new();
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let errors = matching(&recent, &["error"]);
        if !errors.is_empty() {
            let avg = mean_value(&errors);
            scores.push((1.0 - avg * 10.0).max(0.0));
            if avg > ERROR_RATE_LIMIT {
                issues.push(HealthIssue {
                    kind: "high_error_rate".into(),
                    severity: Severity::High,
                    description: format!("Error rate is {:.2}%, above 5% threshold", avg * 100.0),
                    affected_sources: distinct_sources(&errors),
                });
                recommendations.push("Investigate error logs and recent deployments".to_string());
            }
        }

        let latency = matching(&recent, &["duration", "latency"]);
        if !latency.is_empty() {
            let avg = mean_value(&latency);
            scores.push((1.0 - avg / 1000.0).max(0.0));
            if avg > LATENCY_LIMIT_MS {
                issues.push(HealthIssue {
                    kind: "high_latency".into(),
                    severity: Severity::Medium,
                    description: format!("Average response time is {:.0}ms, above 500ms threshold", avg),
                    affected_sources: distinct_sources(&latency),
                });
                recommendations.push("Consider scaling services or optimizing database queries".to_string());
            }
        }

        let cpu = matching(&recent, &["cpu"]);
        if !cpu.is_empty() {
            let avg = mean_value(&cpu);
            scores.push((1.0 - avg / 100.0).max(0.0));
            if avg > CPU_LIMIT_PERCENT {
                issues.push(HealthIssue {
                    kind: "high_cpu_usage".into(),
                    severity: Severity::High,
                    description: format!("CPU usage is {:.1}%, above 70% threshold", avg),
                    affected_sources: distinct_sources(&cpu),
                });
                recommendations.push("Scale horizontally or optimize CPU-intensive operations".to_string());
            }
        }

        let overall_score = if scores.is_empty() { 0.5 } else { stats::mean(&scores) };
        let confidence = (scores.len() as f64 / CONFIDENCE_CATEGORIES).min(1.0);

        let closing = if overall_score < 0.7 {
            "System health is degrading - consider immediate intervention"
        } else if overall_score < 0.8 {
            "Monitor system closely - potential issues detected"
        } else {
            "System is healthy - maintain current monitoring"
        };
        recommendations.push(closing.to_string());

        Ok(HealthSignal {
            overall_score,
            issues,
            recommendations,
            confidence,
            prediction_horizon_minutes: PREDICTION_HORIZON_MINUTES,
            generated_at: now,
        })
    }
}

/// Points whose metric name contains any of `needles`, case-insensitively.
pub(crate) fn matching<'a>(points: &[&'a MetricPoint], needles: &[&str]) -> Vec<&'a MetricPoint> {
    points
        .iter()
        .copied()
        .filter(|p| {
            let name = p.metric_name.to_lowercase();
            needles.iter().any(|n| name.contains(n))
        })
        .collect()
}

pub(crate) fn mean_value(points: &[&MetricPoint]) -> f64 {
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    stats::mean(&values)
}

/// Distinct sources in order of first appearance.
fn distinct_sources(points: &[&MetricPoint]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in points {
        if !out.contains(&p.source) {
            out.push(p.source.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn point(minutes_ago: i64, source: &str, metric: &str, value: f64) -> MetricPoint {
        MetricPoint::new(now() - Duration::minutes(minutes_ago), source, metric, value)
    }

    #[test]
    fn empty_store_is_not_ready() {
        let err = HealthScorer::default().score(&[], now()).unwrap_err();
        assert!(matches!(err, VigilError::NotReady(ref m) if m == "no metrics data available"));
    }

    #[test]
    fn unrecognized_metrics_give_neutral_signal() {
        let pts = vec![point(5, "svc", "queue_depth", 42.0), point(3, "svc", "memory_mb", 900.0)];
        let signal = HealthScorer::default().score(&pts, now()).unwrap();

        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.overall_score, 0.5);
        assert!(signal.issues.is_empty());
        assert_eq!(
            signal.recommendations,
            vec!["System health is degrading - consider immediate intervention".to_string()]
        );
        assert_eq!(signal.prediction_horizon_minutes, 60);
    }

    #[test]
    fn hot_cpu_and_errors_raise_issues() {
        let pts = vec![
            point(10, "payments", "CPU_usage", 90.0),
            point(9, "accounts", "cpu_usage", 80.0),
            point(8, "payments", "cpu_usage", 85.0),
            point(5, "payments", "http_error_rate", 0.2),
        ];
        let signal = HealthScorer::default().score(&pts, now()).unwrap();

        let kinds: Vec<&str> = signal.issues.iter().map(|i| i.kind.as_str()).collect();
        assert_eq!(kinds, vec!["high_error_rate", "high_cpu_usage"]);
        assert_eq!(signal.issues[1].affected_sources, vec!["payments", "accounts"]);
        assert_eq!(signal.issues[1].severity, Severity::High);

        // error score 0.0, cpu score 0.15
        assert!((signal.overall_score - 0.075).abs() < 1e-9);
        assert!((signal.confidence - 0.4).abs() < 1e-12);
        assert_eq!(signal.recommendations.len(), 3);
    }

    #[test]
    fn healthy_latency_and_stale_points_ignored() {
        let pts = vec![
            point(20, "svc", "request_latency_ms", 100.0),
            point(15, "svc", "request_duration", 100.0),
            point(120, "svc", "cpu", 99.0),
        ];
        let signal = HealthScorer::default().score(&pts, now()).unwrap();

        assert!((signal.overall_score - 0.9).abs() < 1e-9);
        assert!(signal.issues.is_empty());
        assert_eq!(
            signal.recommendations.last().map(String::as_str),
            Some("System is healthy - maintain current monitoring")
        );
    }

    #[test]
    fn issue_type_field_name() {
        let pts = vec![point(1, "svc", "cpu", 95.0)];
        let signal = HealthScorer::default().score(&pts, now()).unwrap();
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["issues"][0]["type"], "high_cpu_usage");
        assert_eq!(json["issues"][0]["severity"], "high");
    }

    #[test]
    fn slow_latency_is_medium() {
        let pts = vec![point(1, "svc", "latency", 750.0)];
        let signal = HealthScorer::default().score(&pts, now()).unwrap();
        assert_eq!(signal.issues[0].severity, Severity::Medium);
        assert_eq!(signal.issues[0].description, "Average response time is 750ms, above 500ms threshold");
    }
}
