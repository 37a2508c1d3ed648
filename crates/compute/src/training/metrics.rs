use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::TrainingSummary;

/// Training pass metrics exposed over the API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingMetrics {
    /// Completed training passes.
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration: Duration,
    /// Incremental mean over all runs.
    pub avg_duration: Duration,
    /// Latest forecast accuracy by series ("source/metric").
    pub accuracy: BTreeMap<String, f64>,
    /// Fit failures by series, cumulative.
    pub failures: BTreeMap<String, u64>,
    /// Series fits abandoned for exceeding the time budget, cumulative.
    pub timeouts: u64,
    pub last_summary: Option<TrainingSummary>,
}

impl TrainingMetrics {
    /// Record a completed pass.
    pub fn record_run(&mut self, summary: TrainingSummary, duration: Duration) {
        self.runs += 1;
        self.last_run = Some(Utc::now());
        self.last_duration = duration;

        // new_avg = prev_avg + (duration - prev_avg) / runs
        self.avg_duration = if self.runs == 1 {
            duration
        } else {
            let prev = self.avg_duration.as_nanos() as f64;
            let cur = duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / self.runs as f64) as u64)
        };

        for (series, acc) in &summary.accuracies {
            self.accuracy.insert(series.clone(), *acc);
        }
        self.last_summary = Some(summary);
    }

    pub fn record_failure(&mut self, series: &str) {
        *self.failures.entry(series.to_string()).or_default() += 1;
    }

    pub fn record_timeout(&mut self, series: &str) {
        self.timeouts += 1;
        self.record_failure(series);
    }
}
