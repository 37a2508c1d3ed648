use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use vigil_core::MetricPoint;

/// Guards the rate-of-change division against near-zero previous values.
pub const RATE_EPSILON: f64 = 1e-8;

/// Default number of trailing values fed to the regressor.
pub const DEFAULT_WINDOW: usize = 10;

/// Feature vectors with their regression targets.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Turns a slice of one series into numeric features.
///
/// Forecast vectors are `W` trailing values followed by
/// `[hour, weekday, trend_index]`, so their width is `W + 3`. Anomaly vectors
/// are `[value, rate_of_change, hour, weekday]`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder {
    window_size: usize,
}

impl FeatureBuilder {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Width of a forecast feature vector.
    pub fn forecast_width(&self) -> usize {
        self.window_size + 3
    }

    /// Build one example per index `i >= W`: the previous `W` values plus the
    /// calendar features of `timestamp[i]` and `i` itself as a trend proxy.
    pub fn training_set(&self, slice: &[MetricPoint]) -> TrainingSet {
        let sorted = sorted_by_time(slice);
        let w = self.window_size;
        let mut set = TrainingSet::default();
        if sorted.len() <= w {
            return set;
        }

        let values: Vec<f64> = sorted.iter().map(|p| p.value).collect();
        for i in w..sorted.len() {
            let mut row = Vec::with_capacity(self.forecast_width());
            row.extend_from_slice(&values[i - w..i]);
            row.extend(calendar_features(sorted[i].timestamp));
            row.push(i as f64);
            set.features.push(row);
            set.targets.push(values[i]);
        }
        set
    }

    /// Features for forecasting step `step` (1-based) past `last_timestamp`.
    ///
    /// Returns the future timestamp (`last_timestamp + step` minutes) with the
    /// vector. `history_len` is the number of points the forecast starts from;
    /// the trend index is `history_len + step - 1`.
    pub fn step_features(
        &self,
        window: &[f64],
        last_timestamp: DateTime<Utc>,
        step: usize,
        history_len: usize,
    ) -> (DateTime<Utc>, Vec<f64>) {
        let future = last_timestamp + Duration::minutes(step as i64);
        let mut row = Vec::with_capacity(self.forecast_width());
        row.extend_from_slice(window);
        row.extend(calendar_features(future));
        row.push((history_len + step - 1) as f64);
        (future, row)
    }

    /// One row per index `i >= 1`: value, relative change from the previous
    /// value, hour and weekday.
    pub fn anomaly_features(&self, slice: &[MetricPoint]) -> Vec<Vec<f64>> {
        let sorted = sorted_by_time(slice);
        sorted
            .windows(2)
            .map(|pair| {
                let (prev, cur) = (pair[0], pair[1]);
                let rate = (cur.value - prev.value) / (prev.value + RATE_EPSILON);
                let [hour, weekday] = calendar_features(cur.timestamp);
                vec![cur.value, rate, hour, weekday]
            })
            .collect()
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Stable sort by timestamp ascending.
pub fn sorted_by_time(slice: &[MetricPoint]) -> Vec<&MetricPoint> {
    let mut sorted: Vec<&MetricPoint> = slice.iter().collect();
    sorted.sort_by_key(|p| p.timestamp);
    sorted
}

/// `[hour_of_day, weekday]` with Monday = 0.
fn calendar_features(ts: DateTime<Utc>) -> [f64; 2] {
    [ts.hour() as f64, ts.weekday().num_days_from_monday() as f64]
}
