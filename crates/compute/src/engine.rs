use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vigil_core::config::{EngineConfig, TrainingConfig};
use vigil_core::{MetricPoint, SeriesKey, VigilError};

use crate::anomaly::AnomalyEvent;
use crate::capacity::{CapacityPlan, CapacityProjector};
use crate::features::sorted_by_time;
use crate::forecast::{ConfidenceInterval, PredictedPoint};
use crate::health::{HealthScorer, HealthSignal};
use crate::insights::{InsightReporter, InsightSummary, ModelsStatus};
use crate::poisoned;
use crate::registry::{ModelRegistry, ModelSettings, ModelStatus, SharedModelRegistry, TrainingSummary};
use crate::store::{MetricQuery, MetricStore, SharedMetricStore};
use crate::training::{Trainer, TrainingAck, TrainingMetrics};

/// Most recent points a forecast starts from, widened to the model window
/// when that is larger.
pub const FORECAST_HISTORY: usize = 50;
/// Points required before a forecast or anomaly scan is attempted.
pub const MIN_RECENT_POINTS: usize = 10;
pub const MAX_HORIZON_MINUTES: u32 = 1440;
pub const MAX_LOOKBACK_HOURS: u32 = 720;

const SERVICE_NAME: &str = "vigil";

// ── Requests & responses ──────────────────────────────────────

fn default_horizon() -> u32 {
    60
}

fn default_confidence() -> f64 {
    0.95
}

fn default_lookback() -> u32 {
    24
}

fn default_growth_rate() -> f64 {
    0.1
}

fn default_horizon_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub source: String,
    pub metric_name: String,
    #[serde(default = "default_horizon")]
    pub horizon_minutes: u32,
    /// Echoed back only; intervals are always 95%.
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub source: String,
    pub metric_name: String,
    pub predictions: Vec<PredictedPoint>,
    pub confidence_intervals: Vec<ConfidenceInterval>,
    pub model_accuracy: f64,
    pub horizon_minutes: u32,
    pub confidence_level: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRequest {
    pub source: String,
    pub metric_name: String,
    #[serde(default = "default_lookback")]
    pub lookback_hours: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyResponse {
    pub source: String,
    pub metric_name: String,
    pub anomalies: Vec<AnomalyEvent>,
    pub anomaly_ratio: f64,
    pub threshold: f64,
    pub analysis_period: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityRequest {
    pub source: String,
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestAck {
    pub ingested: usize,
    /// Store size after the append.
    pub stored: usize,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub metrics_stored: usize,
    pub store_capacity: usize,
    pub models_trained: usize,
    pub anomaly_detectors: usize,
    pub training_running: bool,
    pub uptime_secs: i64,
    pub timestamp: DateTime<Utc>,
}

// ── Engine ────────────────────────────────────────────────────

/// Entry point for every external operation.
///
/// Owns the shared store and registry handles and the background trainer.
/// Locks are taken only for short synchronous sections; model fitting runs
/// on the trainer's blocking tasks.
pub struct AnalyticsEngine {
    store: SharedMetricStore,
    registry: SharedModelRegistry,
    trainer: Trainer,
    health: HealthScorer,
    capacity: CapacityProjector,
    insights: InsightReporter,
    started_at: DateTime<Utc>,
}

impl AnalyticsEngine {
    pub fn new(engine: &EngineConfig, training: &TrainingConfig) -> Self {
        let store = MetricStore::new(engine.store_capacity).into_shared();
        let registry = ModelRegistry::new(ModelSettings::from(engine)).into_shared();
        Self::with_parts(
            store,
            registry,
            StdDuration::from_secs(training.series_timeout_secs),
            engine.base_monthly_cost,
        )
    }

    pub fn with_parts(
        store: SharedMetricStore,
        registry: SharedModelRegistry,
        series_budget: StdDuration,
        base_monthly_cost: f64,
    ) -> Self {
        let trainer = Trainer::new(store.clone(), registry.clone(), series_budget);
        Self {
            store,
            registry,
            trainer,
            health: HealthScorer::default(),
            capacity: CapacityProjector::new(base_monthly_cost),
            insights: InsightReporter::default(),
            started_at: Utc::now(),
        }
    }

    pub fn store(&self) -> SharedMetricStore {
        self.store.clone()
    }

    pub fn registry(&self) -> SharedModelRegistry {
        self.registry.clone()
    }

    /// Validate the whole batch, then append it. A batch containing any
    /// malformed point is rejected without touching the store.
    pub fn ingest(&self, points: Vec<MetricPoint>) -> Result<IngestAck, VigilError> {
        for (i, p) in points.iter().enumerate() {
            p.validate()
                .map_err(|e| VigilError::InvalidInput(format!("point {i}: {e}")))?;
        }

        let mut store = self.store.write().map_err(poisoned("metric store"))?;
        let ingested = store.append(points);
        let stored = store.len();
        drop(store);

        info!(ingested, stored, "ingested metric points");
        Ok(IngestAck {
            ingested,
            stored,
            received_at: Utc::now(),
        })
    }

    /// Start a background training pass. Never reports training errors.
    pub fn trigger_training(&self) -> TrainingAck {
        self.trainer.trigger()
    }

    /// Run a training pass and wait for it.
    pub async fn train_now(&self) -> Result<TrainingSummary, VigilError> {
        self.trainer.run().await
    }

    pub fn forecast(&self, req: ForecastRequest) -> Result<ForecastResponse, VigilError> {
        if !(1..=MAX_HORIZON_MINUTES).contains(&req.horizon_minutes) {
            return Err(VigilError::InvalidInput(format!(
                "horizon_minutes must be 1..={MAX_HORIZON_MINUTES}, got {}",
                req.horizon_minutes
            )));
        }
        if !(req.confidence_level > 0.0 && req.confidence_level < 1.0) {
            return Err(VigilError::InvalidInput(format!(
                "confidence_level must be in (0, 1), got {}",
                req.confidence_level
            )));
        }

        let key = SeriesKey::new(&req.source, &req.metric_name);
        let points = self.series_points(&key, None)?;

        let registry = self.registry.read().map_err(poisoned("model registry"))?;
        let model = registry
            .get_forecast(&key)
            .ok_or_else(|| VigilError::NotFound(format!("no forecast model for {key}; train models first")))?;
        if !model.is_trained() {
            return Err(VigilError::NotReady(format!("forecast model for {key} is not trained yet")));
        }

        // A window wider than the default history still gets a full window.
        let history = FORECAST_HISTORY.max(model.window_size());
        let sorted = sorted_by_time(&points);
        let recent: Vec<MetricPoint> = sorted
            .iter()
            .skip(sorted.len().saturating_sub(history))
            .map(|p| (*p).clone())
            .collect();
        if recent.len() < MIN_RECENT_POINTS {
            return Err(VigilError::NotReady(format!(
                "insufficient recent data for {key}: {} points",
                recent.len()
            )));
        }

        let forecast = model.predict(&recent, req.horizon_minutes as usize)?;
        let model_accuracy = model.accuracy();
        drop(registry);

        debug!(series = %key, horizon = req.horizon_minutes, "forecast served");
        Ok(ForecastResponse {
            source: req.source,
            metric_name: req.metric_name,
            predictions: forecast.predictions,
            confidence_intervals: forecast.confidence_intervals,
            model_accuracy,
            horizon_minutes: req.horizon_minutes,
            confidence_level: req.confidence_level,
            generated_at: Utc::now(),
        })
    }

    pub fn detect_anomalies(&self, req: AnomalyRequest) -> Result<AnomalyResponse, VigilError> {
        if !(1..=MAX_LOOKBACK_HOURS).contains(&req.lookback_hours) {
            return Err(VigilError::InvalidInput(format!(
                "lookback_hours must be 1..={MAX_LOOKBACK_HOURS}, got {}",
                req.lookback_hours
            )));
        }

        let key = SeriesKey::new(&req.source, &req.metric_name);
        let since = Utc::now() - Duration::hours(i64::from(req.lookback_hours));
        let points = self.series_points(&key, Some(since))?;

        let registry = self.registry.read().map_err(poisoned("model registry"))?;
        let model = registry
            .get_anomaly(&key)
            .ok_or_else(|| VigilError::NotFound(format!("no anomaly detector for {key}; train models first")))?;
        if !model.is_trained() {
            return Err(VigilError::NotReady(format!("anomaly detector for {key} is not trained yet")));
        }
        if points.len() < MIN_RECENT_POINTS {
            return Err(VigilError::NotReady(format!(
                "insufficient data in the last {} hours for {key}: {} points",
                req.lookback_hours,
                points.len()
            )));
        }

        let report = model.detect(&points)?;
        let threshold = model.threshold();
        drop(registry);

        Ok(AnomalyResponse {
            source: req.source,
            metric_name: req.metric_name,
            anomalies: report.events,
            anomaly_ratio: report.anomaly_ratio,
            threshold,
            analysis_period: format!("{} hours", req.lookback_hours),
            detected_at: Utc::now(),
        })
    }

    pub fn health(&self) -> Result<HealthSignal, VigilError> {
        let snapshot = self.snapshot()?;
        self.health.score(&snapshot, Utc::now())
    }

    pub fn capacity(&self, req: CapacityRequest) -> Result<CapacityPlan, VigilError> {
        let points = self
            .store
            .read()
            .map_err(poisoned("metric store"))?
            .query(&MetricQuery::source(&req.source));
        self.capacity
            .project(&points, &req.source, req.growth_rate, req.horizon_days, Utc::now())
    }

    pub fn insights(&self) -> Result<InsightSummary, VigilError> {
        let snapshot = self.snapshot()?;
        let status = {
            let registry = self.registry.read().map_err(poisoned("model registry"))?;
            ModelsStatus {
                trained_models: registry.forecast_count(),
                anomaly_detectors: registry.anomaly_count(),
                total_metrics_analyzed: snapshot.len(),
            }
        };
        Ok(self.insights.summarize(&snapshot, status, Utc::now()))
    }

    pub fn status(&self) -> Result<EngineStatus, VigilError> {
        let (metrics_stored, store_capacity) = {
            let store = self.store.read().map_err(poisoned("metric store"))?;
            (store.len(), store.capacity())
        };
        let (models_trained, anomaly_detectors) = {
            let registry = self.registry.read().map_err(poisoned("model registry"))?;
            (registry.trained_forecast_count(), registry.trained_anomaly_count())
        };
        let now = Utc::now();
        Ok(EngineStatus {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            metrics_stored,
            store_capacity,
            models_trained,
            anomaly_detectors,
            training_running: self.trainer.is_running(),
            uptime_secs: (now - self.started_at).num_seconds(),
            timestamp: now,
        })
    }

    pub fn training_metrics(&self) -> Result<TrainingMetrics, VigilError> {
        let metrics = self.trainer.metrics();
        let guard = metrics.read().map_err(poisoned("training metrics"))?;
        Ok(guard.clone())
    }

    pub fn models(&self) -> Result<Vec<ModelStatus>, VigilError> {
        Ok(self.registry.read().map_err(poisoned("model registry"))?.statuses())
    }

    fn snapshot(&self) -> Result<Vec<MetricPoint>, VigilError> {
        Ok(self.store.read().map_err(poisoned("metric store"))?.snapshot())
    }

    fn series_points(&self, key: &SeriesKey, since: Option<DateTime<Utc>>) -> Result<Vec<MetricPoint>, VigilError> {
        let mut query = MetricQuery::series(&key.source, &key.metric_name);
        query.since = since;
        Ok(self.store.read().map_err(poisoned("metric store"))?.query(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{ForestParams, IsolationParams};
    use crate::training::TrainingStatus;

    fn engine() -> AnalyticsEngine {
        engine_with(ModelSettings::default())
    }

    fn engine_with(base: ModelSettings) -> AnalyticsEngine {
        let settings = ModelSettings {
            forecast: ForestParams {
                n_trees: 8,
                ..ForestParams::default()
            },
            anomaly: IsolationParams {
                n_trees: 20,
                ..IsolationParams::default()
            },
            ..base
        };
        AnalyticsEngine::with_parts(
            MetricStore::new(1_000).into_shared(),
            ModelRegistry::new(settings).into_shared(),
            StdDuration::from_secs(30),
            1000.0,
        )
    }

    /// `n` points ending now, one minute apart.
    fn recent_series(source: &str, metric: &str, n: usize) -> Vec<MetricPoint> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                let ts = now - Duration::minutes((n - i) as i64);
                MetricPoint::new(ts, source, metric, 100.0 + (i % 5) as f64)
            })
            .collect()
    }

    fn forecast_req(horizon: u32) -> ForecastRequest {
        ForecastRequest {
            source: "svc".into(),
            metric_name: "latency_ms".into(),
            horizon_minutes: horizon,
            confidence_level: 0.95,
        }
    }

    #[test]
    fn malformed_batch_is_rejected_whole() {
        let e = engine();
        let mut batch = recent_series("svc", "cpu", 3);
        batch.push(MetricPoint::new(Utc::now(), "svc", "cpu", f64::NAN));

        assert!(matches!(e.ingest(batch), Err(VigilError::InvalidInput(_))));
        assert_eq!(e.status().unwrap().metrics_stored, 0);
    }

    #[test]
    fn forecast_without_model_is_not_found() {
        let e = engine();
        e.ingest(recent_series("svc", "latency_ms", 30)).unwrap();
        assert!(matches!(e.forecast(forecast_req(5)), Err(VigilError::NotFound(_))));
    }

    #[test]
    fn forecast_validates_parameters() {
        let e = engine();
        assert!(matches!(e.forecast(forecast_req(0)), Err(VigilError::InvalidInput(_))));
        assert!(matches!(e.forecast(forecast_req(1441)), Err(VigilError::InvalidInput(_))));
        let mut req = forecast_req(5);
        req.confidence_level = 1.0;
        assert!(matches!(e.forecast(req), Err(VigilError::InvalidInput(_))));
    }

    #[test]
    fn untrained_model_is_not_ready() {
        let e = engine();
        e.ingest(recent_series("svc", "latency_ms", 30)).unwrap();
        e.registry()
            .write()
            .unwrap()
            .get_or_create_forecast(&SeriesKey::new("svc", "latency_ms"));
        assert!(matches!(e.forecast(forecast_req(5)), Err(VigilError::NotReady(_))));
    }

    #[tokio::test]
    async fn trained_engine_serves_every_operation() {
        let e = engine();
        e.ingest(recent_series("svc", "latency_ms", 60)).unwrap();
        let summary = e.train_now().await.unwrap();
        assert_eq!(summary.forecast_trained, 1);

        let forecast = e.forecast(forecast_req(5)).unwrap();
        assert_eq!(forecast.predictions.len(), 5);
        assert!((0.0..=1.0).contains(&forecast.model_accuracy));

        let anomalies = e
            .detect_anomalies(AnomalyRequest {
                source: "svc".into(),
                metric_name: "latency_ms".into(),
                lookback_hours: 2,
            })
            .unwrap();
        assert_eq!(anomalies.analysis_period, "2 hours");
        assert_eq!(anomalies.threshold, -0.5);

        let health = e.health().unwrap();
        assert!(health.confidence > 0.0);

        let status = e.status().unwrap();
        assert_eq!(status.models_trained, 1);
        assert_eq!(status.metrics_stored, 60);
        assert_eq!(e.training_metrics().unwrap().runs, 1);
        assert_eq!(e.models().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wide_window_still_forecasts() {
        let e = engine_with(ModelSettings {
            window_size: 60,
            min_training_points: 80,
            ..ModelSettings::default()
        });
        e.ingest(recent_series("svc", "latency_ms", 100)).unwrap();
        assert_eq!(e.train_now().await.unwrap().forecast_trained, 1);

        let forecast = e.forecast(forecast_req(3)).unwrap();
        assert_eq!(forecast.predictions.len(), 3);
    }

    #[tokio::test]
    async fn anomaly_scan_needs_points_in_lookback() {
        let e = engine();
        let old: Vec<MetricPoint> = recent_series("svc", "cpu", 40)
            .into_iter()
            .map(|mut p| {
                p.timestamp = p.timestamp - Duration::hours(5);
                p
            })
            .collect();
        e.ingest(old).unwrap();
        e.train_now().await.unwrap();

        let err = e
            .detect_anomalies(AnomalyRequest {
                source: "svc".into(),
                metric_name: "cpu".into(),
                lookback_hours: 1,
            })
            .unwrap_err();
        assert!(matches!(err, VigilError::NotReady(_)));
    }

    #[tokio::test]
    async fn trigger_returns_immediately() {
        let e = engine();
        e.ingest(recent_series("svc", "cpu", 25)).unwrap();
        let ack = e.trigger_training();
        assert_eq!(ack.status, TrainingStatus::Started);
    }

    #[test]
    fn capacity_and_health_errors() {
        let e = engine();
        assert!(matches!(e.health(), Err(VigilError::NotReady(_))));
        let req = CapacityRequest {
            source: "nobody".into(),
            growth_rate: 0.1,
            horizon_days: 30,
        };
        assert!(matches!(e.capacity(req), Err(VigilError::NotFound(_))));

        let insights = e.insights().unwrap();
        assert_eq!(insights.models_status.total_metrics_analyzed, 0);
    }
}
