use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use vigil_core::config::EngineConfig;
use vigil_core::{MetricPoint, SeriesKey, VigilError};

use crate::algorithms::{ForestParams, IsolationParams};
use crate::anomaly::{AnomalyModel, MIN_ANOMALY_POINTS};
use crate::features::DEFAULT_WINDOW;
use crate::forecast::{ForecastModel, MIN_TRAINING_POINTS};

/// Parameters new model instances are created with.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub window_size: usize,
    /// Points a series needs before training is attempted at all.
    pub min_training_points: usize,
    pub min_anomaly_points: usize,
    pub forecast: ForestParams,
    pub anomaly: IsolationParams,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW,
            min_training_points: MIN_TRAINING_POINTS,
            min_anomaly_points: MIN_ANOMALY_POINTS,
            forecast: ForestParams::default(),
            anomaly: IsolationParams::default(),
        }
    }
}

impl From<&EngineConfig> for ModelSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            window_size: cfg.forecast_window,
            min_training_points: cfg.min_training_points,
            min_anomaly_points: cfg.min_anomaly_points,
            forecast: ForestParams {
                n_trees: cfg.forecast_trees,
                ..ForestParams::default()
            },
            anomaly: IsolationParams {
                n_trees: cfg.anomaly_trees,
                ..IsolationParams::default()
            },
        }
    }
}

/// Outcome of one training pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingSummary {
    pub series_considered: usize,
    pub series_skipped: usize,
    pub forecast_trained: usize,
    pub forecast_failed: usize,
    pub anomaly_trained: usize,
    pub anomaly_failed: usize,
    /// Accuracy of each forecast model fitted in this pass, keyed "source/metric".
    pub accuracies: BTreeMap<String, f64>,
}

/// Trained-or-not view of one registered series.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub source: String,
    pub metric_name: String,
    pub forecast_trained: bool,
    pub forecast_accuracy: Option<f64>,
    pub anomaly_trained: bool,
}

/// Per-series model instances.
///
/// Entries are created lazily on the first training attempt and are never
/// removed except by [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct ModelRegistry {
    settings: ModelSettings,
    forecast: HashMap<SeriesKey, ForecastModel>,
    anomaly: HashMap<SeriesKey, AnomalyModel>,
}

/// Thread-safe handle to the model registry.
pub type SharedModelRegistry = Arc<RwLock<ModelRegistry>>;

impl ModelRegistry {
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            settings,
            forecast: HashMap::new(),
            anomaly: HashMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedModelRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn get_or_create_forecast(&mut self, key: &SeriesKey) -> &mut ForecastModel {
        let s = &self.settings;
        self.forecast.entry(key.clone()).or_insert_with(|| {
            ForecastModel::with_settings(
                key.clone(),
                s.window_size,
                s.min_training_points,
                s.forecast.clone(),
            )
        })
    }

    pub fn get_or_create_anomaly(&mut self, key: &SeriesKey) -> &mut AnomalyModel {
        let s = &self.settings;
        self.anomaly.entry(key.clone()).or_insert_with(|| {
            AnomalyModel::with_settings(key.clone(), s.min_anomaly_points, s.anomaly.clone())
        })
    }

    /// `None` means no instance was ever created, which differs from an
    /// instance that exists but is untrained.
    pub fn get_forecast(&self, key: &SeriesKey) -> Option<&ForecastModel> {
        self.forecast.get(key)
    }

    pub fn get_anomaly(&self, key: &SeriesKey) -> Option<&AnomalyModel> {
        self.anomaly.get(key)
    }

    /// Replace stored instances with ones fitted elsewhere.
    pub fn commit(&mut self, forecast: ForecastModel, anomaly: AnomalyModel) {
        self.forecast.insert(forecast.key().clone(), forecast);
        self.anomaly.insert(anomaly.key().clone(), anomaly);
    }

    pub fn clear(&mut self) {
        self.forecast.clear();
        self.anomaly.clear();
    }

    pub fn forecast_count(&self) -> usize {
        self.forecast.len()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomaly.len()
    }

    pub fn trained_forecast_count(&self) -> usize {
        self.forecast.values().filter(|m| m.is_trained()).count()
    }

    pub fn trained_anomaly_count(&self) -> usize {
        self.anomaly.values().filter(|m| m.is_trained()).count()
    }

    /// Status of every registered series, sorted by key.
    pub fn statuses(&self) -> Vec<ModelStatus> {
        let mut keys: Vec<&SeriesKey> = self.forecast.keys().chain(self.anomaly.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .map(|key| {
                let forecast = self.forecast.get(key);
                ModelStatus {
                    source: key.source.clone(),
                    metric_name: key.metric_name.clone(),
                    forecast_trained: forecast.is_some_and(|m| m.is_trained()),
                    forecast_accuracy: forecast.filter(|m| m.is_trained()).map(|m| m.accuracy()),
                    anomaly_trained: self.anomaly.get(key).is_some_and(|m| m.is_trained()),
                }
            })
            .collect()
    }

    /// Get-or-create both models of `key` and hand out clones to fit.
    pub fn checkout(&mut self, key: &SeriesKey) -> (ForecastModel, AnomalyModel) {
        let forecast = self.get_or_create_forecast(key).clone();
        let anomaly = self.get_or_create_anomaly(key).clone();
        (forecast, anomaly)
    }

    /// Train both models of every series with enough points.
    ///
    /// Groups with fewer than `min_training_points` are skipped without
    /// creating instances. A failure in one series is logged and does not
    /// affect the others.
    pub fn train_all(&mut self, points: &[MetricPoint]) -> TrainingSummary {
        let (eligible, mut summary) = plan_pass(points, self.settings.min_training_points);

        for (key, slice) in eligible {
            let (forecast, anomaly) = self.checkout(&key);
            let fit = SeriesFit::fit(forecast, anomaly, &slice);
            fit.tally(&key, &mut summary);
            self.commit(fit.forecast, fit.anomaly);
        }

        info!(
            considered = summary.series_considered,
            skipped = summary.series_skipped,
            forecast_trained = summary.forecast_trained,
            anomaly_trained = summary.anomaly_trained,
            "training pass complete"
        );
        summary
    }
}

/// Both models of one series after a fit attempt.
///
/// A model whose fit failed is returned as it was handed in, so committing
/// both back is always safe.
pub struct SeriesFit {
    pub forecast: ForecastModel,
    pub anomaly: AnomalyModel,
    forecast_result: Result<f64, VigilError>,
    anomaly_result: Result<(), VigilError>,
}

impl SeriesFit {
    pub fn fit(mut forecast: ForecastModel, mut anomaly: AnomalyModel, slice: &[MetricPoint]) -> Self {
        let forecast_result = forecast.train(slice);
        let anomaly_result = anomaly.train(slice);
        Self {
            forecast,
            anomaly,
            forecast_result,
            anomaly_result,
        }
    }

    /// Add this fit to `summary`, logging each failure. Returns true if
    /// either model failed.
    pub fn tally(&self, key: &SeriesKey, summary: &mut TrainingSummary) -> bool {
        let mut failed = false;
        match &self.forecast_result {
            Ok(accuracy) => {
                summary.forecast_trained += 1;
                summary.accuracies.insert(key.to_string(), *accuracy);
            }
            Err(e) => {
                failed = true;
                summary.forecast_failed += 1;
                warn!(series = %key, error = %e, "forecast training failed");
            }
        }
        match &self.anomaly_result {
            Ok(()) => summary.anomaly_trained += 1,
            Err(e) => {
                failed = true;
                summary.anomaly_failed += 1;
                warn!(series = %key, error = %e, "anomaly training failed");
            }
        }
        failed
    }
}

/// Group a snapshot by series and count the groups too short to train.
///
/// Returns the eligible groups in key order and a summary with
/// `series_considered` and `series_skipped` filled in.
pub fn plan_pass(
    points: &[MetricPoint],
    min_points: usize,
) -> (Vec<(SeriesKey, Vec<MetricPoint>)>, TrainingSummary) {
    let groups = group_by_series(points);
    let mut summary = TrainingSummary {
        series_considered: groups.len(),
        ..TrainingSummary::default()
    };
    let eligible = groups
        .into_iter()
        .filter(|(_, slice)| {
            let keep = slice.len() >= min_points;
            if !keep {
                summary.series_skipped += 1;
            }
            keep
        })
        .collect();
    (eligible, summary)
}

/// Partition points by series, preserving arrival order inside each group.
pub fn group_by_series(points: &[MetricPoint]) -> BTreeMap<SeriesKey, Vec<MetricPoint>> {
    let mut groups: BTreeMap<SeriesKey, Vec<MetricPoint>> = BTreeMap::new();
    for p in points {
        groups.entry(p.series_key()).or_default().push(p.clone());
    }
    groups
}
