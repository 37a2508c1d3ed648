use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use vigil_core::MetricPoint;

/// Default number of points retained.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Filter for [`MetricStore::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MetricQuery {
    pub source: Option<String>,
    pub metric_name: Option<String>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl MetricQuery {
    pub fn series(source: &str, metric_name: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            metric_name: Some(metric_name.to_string()),
            ..Self::default()
        }
    }

    pub fn source(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    fn matches(&self, p: &MetricPoint) -> bool {
        self.source.as_deref().map_or(true, |s| s == p.source)
            && self.metric_name.as_deref().map_or(true, |m| m == p.metric_name)
            && self.since.map_or(true, |t| p.timestamp >= t)
            && self.until.map_or(true, |t| p.timestamp <= t)
    }
}

/// Bounded buffer of observations in arrival order.
///
/// Once more than `capacity` points have been appended the oldest are evicted,
/// so the store always holds the most recent `capacity` points in their
/// original relative order. Points are not re-sorted by timestamp.
#[derive(Debug)]
pub struct MetricStore {
    points: VecDeque<MetricPoint>,
    capacity: usize,
    evicted: u64,
}

/// Thread-safe handle to the metric store.
pub type SharedMetricStore = Arc<RwLock<MetricStore>>;

impl MetricStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    pub fn into_shared(self) -> SharedMetricStore {
        Arc::new(RwLock::new(self))
    }

    /// Append points, then evict from the front down to capacity.
    pub fn append(&mut self, points: impl IntoIterator<Item = MetricPoint>) -> usize {
        let mut count = 0;
        for p in points {
            self.points.push_back(p);
            count += 1;
        }

        let mut dropped = 0u64;
        while self.points.len() > self.capacity {
            self.points.pop_front();
            dropped += 1;
        }
        self.evicted += dropped;

        if dropped > 0 {
            debug!(appended = count, evicted = dropped, "metric store at capacity");
        }
        count
    }

    pub fn query(&self, query: &MetricQuery) -> Vec<MetricPoint> {
        self.points.iter().filter(|p| query.matches(p)).cloned().collect()
    }

    /// Copy of every stored point, in arrival order.
    pub fn snapshot(&self) -> Vec<MetricPoint> {
        self.points.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total points evicted since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
