use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use vigil_core::VigilError;

use crate::poisoned;
use crate::registry::{plan_pass, SeriesFit, SharedModelRegistry, TrainingSummary};
use crate::store::SharedMetricStore;

use super::metrics::TrainingMetrics;

/// Thread-safe handle to training metrics.
pub type SharedTrainingMetrics = Arc<RwLock<TrainingMetrics>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Started,
    AlreadyRunning,
}

/// Acknowledgement returned by [`Trainer::trigger`]; carries no results.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingAck {
    pub status: TrainingStatus,
    pub message: String,
    pub requested_at: DateTime<Utc>,
}

/// Resets the single-flight flag when a pass ends, including on panic.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs training passes against shared store and registry handles.
///
/// Cloning is cheap; clones share the single-flight flag and metrics.
#[derive(Clone)]
pub struct Trainer {
    store: SharedMetricStore,
    registry: SharedModelRegistry,
    metrics: SharedTrainingMetrics,
    series_budget: Duration,
    running: Arc<AtomicBool>,
}

impl Trainer {
    pub fn new(store: SharedMetricStore, registry: SharedModelRegistry, series_budget: Duration) -> Self {
        Self {
            store,
            registry,
            metrics: Arc::new(RwLock::new(TrainingMetrics::default())),
            series_budget,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn metrics(&self) -> SharedTrainingMetrics {
        Arc::clone(&self.metrics)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a background pass unless one is already in flight.
    ///
    /// Must be called from within a tokio runtime. Failures inside the pass
    /// are logged and never reach the caller.
    pub fn trigger(&self) -> TrainingAck {
        let requested_at = Utc::now();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("training trigger ignored, pass already running");
            return TrainingAck {
                status: TrainingStatus::AlreadyRunning,
                message: "A training pass is already running".into(),
                requested_at,
            };
        }

        let guard = RunGuard(Arc::clone(&self.running));
        let trainer = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = trainer.run().await {
                warn!(error = %e, "training pass aborted");
            }
        });

        TrainingAck {
            status: TrainingStatus::Started,
            message: "Model training started in background".into(),
            requested_at,
        }
    }

    /// One full pass over a point-in-time snapshot of the store.
    ///
    /// Points ingested while the pass runs are picked up by the next one.
    /// A fit that outlives the series budget is abandoned; its result is
    /// discarded when the blocking task eventually finishes.
    pub async fn run(&self) -> Result<TrainingSummary, VigilError> {
        let started = Instant::now();
        let snapshot = self.store.read().map_err(poisoned("metric store"))?.snapshot();
        let min_points = self
            .registry
            .read()
            .map_err(poisoned("model registry"))?
            .settings()
            .min_training_points;

        let (eligible, mut summary) = plan_pass(&snapshot, min_points);
        drop(snapshot);

        for (key, slice) in eligible {
            let (forecast, anomaly) = self.registry.write().map_err(poisoned("model registry"))?.checkout(&key);

            let handle = tokio::task::spawn_blocking(move || SeriesFit::fit(forecast, anomaly, &slice));
            match tokio::time::timeout(self.series_budget, handle).await {
                Ok(Ok(fit)) => {
                    if fit.tally(&key, &mut summary) {
                        self.record(|m| m.record_failure(&key.to_string()));
                    }
                    self.registry
                        .write()
                        .map_err(poisoned("model registry"))?
                        .commit(fit.forecast, fit.anomaly);
                }
                Ok(Err(join_err)) => {
                    error!(series = %key, error = %join_err, "series fit panicked");
                    summary.forecast_failed += 1;
                    summary.anomaly_failed += 1;
                    self.record(|m| m.record_failure(&key.to_string()));
                }
                Err(_) => {
                    warn!(series = %key, budget = ?self.series_budget, "series fit timed out");
                    summary.forecast_failed += 1;
                    summary.anomaly_failed += 1;
                    self.record(|m| m.record_timeout(&key.to_string()));
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            considered = summary.series_considered,
            skipped = summary.series_skipped,
            forecast_trained = summary.forecast_trained,
            forecast_failed = summary.forecast_failed,
            anomaly_trained = summary.anomaly_trained,
            anomaly_failed = summary.anomaly_failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "background training pass complete"
        );
        let last = summary.clone();
        self.record(move |m| m.record_run(last, elapsed));
        Ok(summary)
    }

    fn record(&self, update: impl FnOnce(&mut TrainingMetrics)) {
        match self.metrics.write() {
            Ok(mut m) => update(&mut m),
            Err(e) => warn!(error = %e, "training metrics lock poisoned, record dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use vigil_core::{MetricPoint, SeriesKey};

    use crate::algorithms::{ForestParams, IsolationParams};
    use crate::registry::{ModelRegistry, ModelSettings};
    use crate::store::MetricStore;

    fn settings() -> ModelSettings {
        ModelSettings {
            forecast: ForestParams {
                n_trees: 8,
                ..ForestParams::default()
            },
            anomaly: IsolationParams {
                n_trees: 20,
                ..IsolationParams::default()
            },
            ..ModelSettings::default()
        }
    }

    fn store_with(series: &[(&str, &str, usize)]) -> SharedMetricStore {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut store = MetricStore::new(10_000);
        for (source, metric, n) in series {
            store.append((0..*n).map(|i| {
                MetricPoint::new(
                    base + ChronoDuration::minutes(i as i64),
                    *source,
                    *metric,
                    50.0 + (i % 9) as f64,
                )
            }));
        }
        store.into_shared()
    }

    fn trainer(store: SharedMetricStore, budget: Duration) -> (Trainer, SharedModelRegistry) {
        let registry = ModelRegistry::new(settings()).into_shared();
        (Trainer::new(store, Arc::clone(&registry), budget), registry)
    }

    #[tokio::test]
    async fn run_trains_eligible_series() {
        let store = store_with(&[("svc", "cpu", 40), ("svc", "mem", 10)]);
        let (t, registry) = trainer(store, Duration::from_secs(30));

        let summary = t.run().await.unwrap();
        assert_eq!(summary.series_considered, 2);
        assert_eq!(summary.series_skipped, 1);
        assert_eq!(summary.forecast_trained, 1);
        assert_eq!(summary.anomaly_trained, 1);

        let reg = registry.read().unwrap();
        assert!(reg.get_forecast(&SeriesKey::new("svc", "cpu")).is_some_and(|m| m.is_trained()));
        assert!(reg.get_forecast(&SeriesKey::new("svc", "mem")).is_none());

        let m = t.metrics();
        let m = m.read().unwrap();
        assert_eq!(m.runs, 1);
        assert!(m.accuracy.contains_key("svc/cpu"));
    }

    #[tokio::test]
    async fn exhausted_budget_is_isolated() {
        let store = store_with(&[("svc", "cpu", 1000)]);
        let registry = ModelRegistry::new(ModelSettings::default()).into_shared();
        let t = Trainer::new(store, Arc::clone(&registry), Duration::ZERO);

        let summary = t.run().await.unwrap();
        assert_eq!(summary.forecast_trained, 0);
        assert_eq!(summary.forecast_failed, 1);
        assert_eq!(t.metrics().read().unwrap().timeouts, 1);

        // Instances exist but were never committed as trained.
        let reg = registry.read().unwrap();
        assert!(reg.get_forecast(&SeriesKey::new("svc", "cpu")).is_some_and(|m| !m.is_trained()));
    }

    #[tokio::test]
    async fn one_failing_series_does_not_block_others() {
        // 22 points leave no forecast rows for a 25-wide window.
        let store = store_with(&[("svc", "cpu", 40), ("svc", "mem", 22)]);
        let registry = ModelRegistry::new(ModelSettings {
            window_size: 25,
            ..settings()
        })
        .into_shared();
        let t = Trainer::new(store, Arc::clone(&registry), Duration::from_secs(30));

        let summary = t.run().await.unwrap();
        assert_eq!(summary.series_skipped, 0);
        assert_eq!(summary.forecast_trained, 1);
        assert_eq!(summary.forecast_failed, 1);
        assert_eq!(summary.anomaly_trained, 2);
        assert!(summary.accuracies.contains_key("svc/cpu"));
        assert!(!summary.accuracies.contains_key("svc/mem"));

        let reg = registry.read().unwrap();
        assert!(reg.get_forecast(&SeriesKey::new("svc", "cpu")).is_some_and(|m| m.is_trained()));
        assert!(reg.get_forecast(&SeriesKey::new("svc", "mem")).is_some_and(|m| !m.is_trained()));
        assert!(reg.get_anomaly(&SeriesKey::new("svc", "mem")).is_some_and(|m| m.is_trained()));
        assert_eq!(t.metrics().read().unwrap().failures.get("svc/mem"), Some(&1));
    }

    #[tokio::test]
    async fn poisoned_metrics_do_not_abort_the_pass() {
        let store = store_with(&[("svc", "cpu", 30)]);
        let (t, registry) = trainer(store, Duration::from_secs(30));

        let metrics = t.metrics();
        let _ = std::thread::spawn(move || {
            let _held = metrics.write().unwrap();
            panic!("poison the metrics lock");
        })
        .join();
        assert!(t.metrics().is_poisoned());

        let summary = t.run().await.unwrap();
        assert_eq!(summary.forecast_trained, 1);
        assert_eq!(registry.read().unwrap().trained_forecast_count(), 1);
    }

    #[tokio::test]
    async fn overlapping_trigger_is_acknowledged_as_running() {
        let store = store_with(&[("svc", "cpu", 30)]);
        let (t, registry) = trainer(store, Duration::from_secs(30));

        let first = t.trigger();
        let second = t.trigger();
        assert_eq!(first.status, TrainingStatus::Started);
        assert_eq!(second.status, TrainingStatus::AlreadyRunning);

        for _ in 0..500 {
            if !t.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!t.is_running());
        assert_eq!(registry.read().unwrap().trained_forecast_count(), 1);
        assert_eq!(t.trigger().status, TrainingStatus::Started);
    }
}
