use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use vigil_core::{MetricPoint, SeriesKey, VigilError};

use crate::algorithms::{train_test_split, ForestParams, RegressionForest, StandardScaler};
use crate::features::{sorted_by_time, FeatureBuilder, DEFAULT_WINDOW};
use crate::stats;

/// Raw points a series needs before a forecast model is trained.
pub const MIN_TRAINING_POINTS: usize = 20;

const TEST_FRACTION: f64 = 0.2;
const SPLIT_SEED: u64 = 42;
const ACCURACY_EPSILON: f64 = 1e-8;
/// z-value of the fixed 95% normal interval.
const Z_95: f64 = 1.96;
const CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Clone, Serialize)]
pub struct PredictedPoint {
    pub timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    /// 1-based step past the last observed point.
    pub step: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceInterval {
    pub timestamp: DateTime<Utc>,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: f64,
}

/// Multi-step forecast with one interval per step.
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub predictions: Vec<PredictedPoint>,
    pub confidence_intervals: Vec<ConfidenceInterval>,
}

#[derive(Debug, Clone)]
struct FittedRegressor {
    scaler: StandardScaler,
    forest: RegressionForest,
}

/// Per-series regressor predicting the next value from a trailing window.
///
/// A model starts untrained. A successful [`train`](Self::train) replaces the
/// fitted state and accuracy; a failed one leaves both untouched.
#[derive(Debug, Clone)]
pub struct ForecastModel {
    key: SeriesKey,
    features: FeatureBuilder,
    params: ForestParams,
    min_points: usize,
    fitted: Option<FittedRegressor>,
    accuracy: f64,
    trained_at: Option<DateTime<Utc>>,
}

impl ForecastModel {
    pub fn new(key: SeriesKey) -> Self {
        Self::with_settings(key, DEFAULT_WINDOW, MIN_TRAINING_POINTS, ForestParams::default())
    }

    pub fn with_settings(
        key: SeriesKey,
        window_size: usize,
        min_points: usize,
        params: ForestParams,
    ) -> Self {
        Self {
            key,
            features: FeatureBuilder::new(window_size),
            params,
            min_points,
            fitted: None,
            accuracy: 0.0,
            trained_at: None,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// Held-out accuracy of the last successful fit, in `[0, 1]`.
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    pub fn window_size(&self) -> usize {
        self.features.window_size()
    }

    /// Fit on one series and return the held-out accuracy.
    ///
    /// accuracy = max(0, 1 - MAE / (mean(test targets) + 1e-8)), capped at 1.
    pub fn train(&mut self, slice: &[MetricPoint]) -> Result<f64, VigilError> {
        if slice.len() < self.min_points {
            return Err(VigilError::training(
                &self.key,
                format!("need at least {} points, got {}", self.min_points, slice.len()),
            ));
        }

        let set = self.features.training_set(slice);
        if set.is_empty() {
            return Err(VigilError::training(&self.key, "no training examples"));
        }

        let (train_idx, test_idx) = train_test_split(set.len(), TEST_FRACTION, SPLIT_SEED);
        let pick_rows = |idx: &[usize]| -> Vec<Vec<f64>> {
            idx.iter().map(|&i| set.features[i].clone()).collect()
        };
        let pick_targets = |idx: &[usize]| -> Vec<f64> { idx.iter().map(|&i| set.targets[i]).collect() };

        let x_train = pick_rows(&train_idx);
        let y_train = pick_targets(&train_idx);
        // Without a held-out split, score on the training rows.
        let (x_test, y_test) = if test_idx.is_empty() {
            (x_train.clone(), y_train.clone())
        } else {
            (pick_rows(&test_idx), pick_targets(&test_idx))
        };

        let fit_err = |e: VigilError| VigilError::training(&self.key, e.to_string());
        let scaler = StandardScaler::fit(&x_train).map_err(fit_err)?;
        let forest =
            RegressionForest::fit(&scaler.transform_all(&x_train), &y_train, &self.params).map_err(fit_err)?;

        let predicted = forest.predict_all(&scaler.transform_all(&x_test));
        let mae = stats::mean_absolute_error(&y_test, &predicted);
        let accuracy = (1.0 - mae / (stats::mean(&y_test) + ACCURACY_EPSILON)).clamp(0.0, 1.0);
        if !accuracy.is_finite() {
            return Err(VigilError::training(&self.key, "accuracy is not finite"));
        }

        self.fitted = Some(FittedRegressor { scaler, forest });
        self.accuracy = accuracy;
        self.trained_at = Some(Utc::now());

        info!(
            series = %self.key,
            examples = set.len(),
            accuracy,
            "forecast model trained"
        );
        Ok(accuracy)
    }

    /// Recursive multi-step forecast starting from the last `W` points.
    ///
    /// Each step's prediction is pushed into the window used by the next step,
    /// so errors compound with the horizon. Intervals are
    /// `pred ± 1.96 * std(window)` where the window is the one the step was
    /// predicted from; they do not reflect model residuals.
    pub fn predict(&self, slice: &[MetricPoint], horizon: usize) -> Result<Forecast, VigilError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| {
            VigilError::NotReady(format!("forecast model for {} is not trained", self.key))
        })?;
        if horizon == 0 {
            return Err(VigilError::InvalidInput("horizon must be at least 1".into()));
        }

        let w = self.window_size();
        let sorted = sorted_by_time(slice);
        if sorted.len() < w {
            return Err(VigilError::NotReady(format!(
                "need {} recent points for {}, got {}",
                w,
                self.key,
                sorted.len()
            )));
        }

        let recent = &sorted[sorted.len() - w..];
        let last_timestamp = recent[w - 1].timestamp;
        let mut window: VecDeque<f64> = recent.iter().map(|p| p.value).collect();

        let mut predictions = Vec::with_capacity(horizon);
        let mut confidence_intervals = Vec::with_capacity(horizon);

        for step in 1..=horizon {
            let current: Vec<f64> = window.iter().copied().collect();
            let (timestamp, row) = self.features.step_features(&current, last_timestamp, step, w);
            let predicted_value = fitted.forest.predict(&fitted.scaler.transform(&row));
            let sigma = stats::stddev(&current);

            predictions.push(PredictedPoint {
                timestamp,
                predicted_value,
                step,
            });
            confidence_intervals.push(ConfidenceInterval {
                timestamp,
                lower_bound: predicted_value - Z_95 * sigma,
                upper_bound: predicted_value + Z_95 * sigma,
                confidence_level: CONFIDENCE_LEVEL,
            });

            window.pop_front();
            window.push_back(predicted_value);
        }

        debug!(series = %self.key, horizon, "forecast produced");
        Ok(Forecast {
            predictions,
            confidence_intervals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn key() -> SeriesKey {
        SeriesKey::new("svc-a", "latency_ms")
    }

    fn model() -> ForecastModel {
        let params = ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        };
        ForecastModel::with_settings(key(), 10, MIN_TRAINING_POINTS, params)
    }

    fn series(values: impl IntoIterator<Item = f64>) -> Vec<MetricPoint> {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| MetricPoint::new(base + Duration::minutes(i as i64), "svc-a", "latency_ms", v))
            .collect()
    }

    #[test]
    fn train_requires_minimum_points() {
        let mut m = model();
        let err = m.train(&series((0..19).map(|v| v as f64))).unwrap_err();
        assert!(matches!(err, VigilError::TrainingFailure { .. }));
        assert!(!m.is_trained());
        assert_eq!(m.accuracy(), 0.0);
    }

    #[test]
    fn train_sets_accuracy_in_unit_range() {
        let mut m = model();
        let acc = m.train(&series((0..60).map(|v| 100.0 + v as f64))).unwrap();
        assert!(m.is_trained());
        assert!((0.0..=1.0).contains(&acc));
        assert_eq!(m.accuracy(), acc);
        assert!(m.trained_at().is_some());
    }

    #[test]
    fn failed_retrain_keeps_previous_state() {
        let mut m = model();
        let acc = m.train(&series((0..40).map(|v| v as f64 + 50.0))).unwrap();
        assert!(m.train(&series([1.0, 2.0, 3.0])).is_err());
        assert!(m.is_trained());
        assert_eq!(m.accuracy(), acc);
    }

    #[test]
    fn predict_untrained_is_not_ready() {
        let m = model();
        let err = m.predict(&series((0..30).map(|v| v as f64)), 3).unwrap_err();
        assert!(matches!(err, VigilError::NotReady(_)));
    }

    #[test]
    fn predict_needs_a_full_window() {
        let mut m = model();
        m.train(&series((0..30).map(|v| v as f64))).unwrap();
        let err = m.predict(&series((0..9).map(|v| v as f64)), 3).unwrap_err();
        assert!(matches!(err, VigilError::NotReady(_)));
    }

    #[test]
    fn predict_emits_ordered_steps_within_bounds() {
        let mut m = model();
        let data = series((0..50).map(|v| 200.0 + (v % 5) as f64 * 3.0));
        m.train(&data).unwrap();

        let forecast = m.predict(&data, 6).unwrap();
        assert_eq!(forecast.predictions.len(), 6);
        assert_eq!(forecast.confidence_intervals.len(), 6);

        let last_ts = data.last().unwrap().timestamp;
        for (i, (p, ci)) in forecast
            .predictions
            .iter()
            .zip(&forecast.confidence_intervals)
            .enumerate()
        {
            assert_eq!(p.step, i + 1);
            assert_eq!(p.timestamp, last_ts + Duration::minutes(i as i64 + 1));
            assert_eq!(ci.timestamp, p.timestamp);
            assert!(ci.lower_bound <= p.predicted_value && p.predicted_value <= ci.upper_bound);
            assert_eq!(ci.confidence_level, 0.95);
        }
    }

    #[test]
    fn first_interval_uses_trailing_window_std() {
        let mut m = model();
        let data = series((0..40).map(|v| (v * 7 % 11) as f64 + 10.0));
        m.train(&data).unwrap();

        let forecast = m.predict(&data, 2).unwrap();
        let tail: Vec<f64> = data[data.len() - 10..].iter().map(|p| p.value).collect();
        let width = forecast.confidence_intervals[0].upper_bound - forecast.confidence_intervals[0].lower_bound;
        assert!((width - 2.0 * 1.96 * stats::stddev(&tail)).abs() < 1e-9);

        // Step two slides the first prediction into the window.
        let mut slid = tail[1..].to_vec();
        slid.push(forecast.predictions[0].predicted_value);
        let width2 = forecast.confidence_intervals[1].upper_bound - forecast.confidence_intervals[1].lower_bound;
        assert!((width2 - 2.0 * 1.96 * stats::stddev(&slid)).abs() < 1e-9);
    }

    #[test]
    fn zero_horizon_is_invalid() {
        let mut m = model();
        let data = series((0..30).map(|v| v as f64));
        m.train(&data).unwrap();
        assert!(matches!(m.predict(&data, 0), Err(VigilError::InvalidInput(_))));
    }
}
