use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::{MetricPoint, VigilError};

use crate::health::{matching, mean_value};

/// Capacity categories, in report order.
pub const CATEGORIES: [&str; 4] = ["cpu", "memory", "connections", "requests"];

pub const DEFAULT_BASE_MONTHLY_COST: f64 = 1000.0;
const MAX_HORIZON_DAYS: u32 = 3650;
const SCALE_PEAK_PERCENT: f64 = 80.0;
const MONITOR_GROWTH: f64 = 1.5;
const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityUnit {
    Percent,
    Count,
}

fn is_percent(category: &str) -> bool {
    matches!(category, "cpu" | "memory")
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUsage {
    pub average: f64,
    pub peak: f64,
    pub unit: CapacityUnit,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectedUsage {
    pub average: f64,
    pub peak: f64,
    pub growth_factor: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub week: u32,
    pub metric: String,
    pub projected_value: f64,
    pub capacity_utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub current_monthly_cost: f64,
    pub projected_monthly_cost: f64,
    pub additional_cost: f64,
    pub cost_per_user_growth: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityPlan {
    pub source: String,
    /// Keyed by category; only categories with data appear.
    pub current: BTreeMap<String, CurrentUsage>,
    pub projected: BTreeMap<String, ProjectedUsage>,
    pub recommendations: Vec<String>,
    pub cost: CostEstimate,
    pub timeline: Vec<TimelineEntry>,
    pub generated_at: DateTime<Utc>,
}

/// Compound-growth projection of one source's resource usage.
#[derive(Debug, Clone)]
pub struct CapacityProjector {
    base_monthly_cost: f64,
    window: Duration,
}

impl Default for CapacityProjector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_MONTHLY_COST)
    }
}

impl CapacityProjector {
    pub fn new(base_monthly_cost: f64) -> Self {
        Self {
            base_monthly_cost,
            window: Duration::hours(24),
        }
    }

    /// `points` may cover any sources; only `source` is considered.
    pub fn project(
        &self,
        points: &[MetricPoint],
        source: &str,
        growth_rate: f64,
        horizon_days: u32,
        now: DateTime<Utc>,
    ) -> Result<CapacityPlan, VigilError> {
        if !growth_rate.is_finite() || growth_rate <= -1.0 {
            return Err(VigilError::InvalidInput(format!(
                "growth_rate must be finite and greater than -1, got {growth_rate}"
            )));
        }
        if !(1..=MAX_HORIZON_DAYS).contains(&horizon_days) {
            return Err(VigilError::InvalidInput(format!(
                "planning horizon must be 1..={MAX_HORIZON_DAYS} days, got {horizon_days}"
            )));
        }

        let owned: Vec<&MetricPoint> = points.iter().filter(|p| p.source == source).collect();
        if owned.is_empty() {
            return Err(VigilError::NotFound(format!("no data found for source: {source}")));
        }

        let cutoff = now - self.window;
        let recent: Vec<&MetricPoint> = owned.into_iter().filter(|p| p.timestamp >= cutoff).collect();
        let multiplier = growth_multiplier(growth_rate, horizon_days as f64);

        let mut plan = CapacityPlan {
            source: source.to_string(),
            current: BTreeMap::new(),
            projected: BTreeMap::new(),
            recommendations: Vec::new(),
            cost: self.cost(growth_rate, multiplier),
            timeline: Vec::new(),
            generated_at: now,
        };

        for category in CATEGORIES {
            let hits = matching(&recent, &[category]);
            if hits.is_empty() {
                continue;
            }
            let average = mean_value(&hits);
            let peak = hits.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
            let projected_avg = average * multiplier;
            let projected_peak = peak * multiplier;

            if is_percent(category) && projected_peak > SCALE_PEAK_PERCENT {
                plan.recommendations.push(format!(
                    "Scale {category} capacity - projected to reach {projected_peak:.1}% in {horizon_days} days"
                ));
            } else if projected_avg > average * MONITOR_GROWTH {
                plan.recommendations.push(format!(
                    "Monitor {category} usage - {:.1}% increase expected",
                    (multiplier - 1.0) * 100.0
                ));
            }

            for week in 1..=(horizon_days / 7).min(4) {
                let projected_value = average * growth_multiplier(growth_rate, (week * 7) as f64);
                plan.timeline.push(TimelineEntry {
                    week,
                    metric: category.to_string(),
                    projected_value,
                    capacity_utilization: if is_percent(category) {
                        projected_value / 100.0
                    } else {
                        projected_value
                    },
                });
            }

            plan.current.insert(
                category.to_string(),
                CurrentUsage {
                    average,
                    peak,
                    unit: if is_percent(category) { CapacityUnit::Percent } else { CapacityUnit::Count },
                },
            );
            plan.projected.insert(
                category.to_string(),
                ProjectedUsage {
                    average: projected_avg,
                    peak: projected_peak,
                    growth_factor: multiplier,
                },
            );
        }

        Ok(plan)
    }

    fn cost(&self, growth_rate: f64, multiplier: f64) -> CostEstimate {
        let base = self.base_monthly_cost;
        let additional = base * (multiplier - 1.0);
        CostEstimate {
            current_monthly_cost: base,
            projected_monthly_cost: base * multiplier,
            additional_cost: additional,
            cost_per_user_growth: additional / (growth_rate * 100.0).max(1.0),
        }
    }
}

/// `(1 + g)^(days / 30)`.
pub fn growth_multiplier(growth_rate: f64, days: f64) -> f64 {
    (1.0 + growth_rate).powf(days / DAYS_PER_MONTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn point(hours_ago: i64, source: &str, metric: &str, value: f64) -> MetricPoint {
        MetricPoint::new(now() - Duration::hours(hours_ago), source, metric, value)
    }

    fn sample() -> Vec<MetricPoint> {
        vec![
            point(1, "db", "cpu_percent", 40.0),
            point(2, "db", "cpu_percent", 60.0),
            point(3, "db", "active_connections", 200.0),
            point(3, "web", "cpu_percent", 99.0),
            point(48, "db", "cpu_percent", 100.0),
        ]
    }

    #[test]
    fn zero_growth_keeps_averages() {
        let plan = CapacityProjector::default().project(&sample(), "db", 0.0, 30, now()).unwrap();

        let cpu = &plan.projected["cpu"];
        assert_eq!(cpu.average, plan.current["cpu"].average);
        assert_eq!(cpu.growth_factor, 1.0);
        assert_eq!(plan.current["cpu"].average, 50.0);
        assert_eq!(plan.current["cpu"].peak, 60.0);
        assert_eq!(plan.current["connections"].unit, CapacityUnit::Count);
        assert!(!plan.current.contains_key("memory"));
        assert!(plan.recommendations.is_empty());
        assert_eq!(plan.cost.additional_cost, 0.0);
    }

    #[test]
    fn strong_growth_recommends_scaling() {
        let plan = CapacityProjector::default().project(&sample(), "db", 0.5, 60, now()).unwrap();

        // multiplier = 1.5^2 = 2.25; cpu peak 60 -> 135
        assert!((plan.projected["cpu"].peak - 135.0).abs() < 1e-9);
        assert_eq!(plan.recommendations[0], "Scale cpu capacity - projected to reach 135.0% in 60 days");
        assert_eq!(plan.recommendations[1], "Monitor connections usage - 125.0% increase expected");
        assert!((plan.cost.projected_monthly_cost - 2250.0).abs() < 1e-9);
        assert!((plan.cost.cost_per_user_growth - 1250.0 / 50.0).abs() < 1e-9);
    }

    #[test]
    fn timeline_is_capped_at_four_weeks() {
        let plan = CapacityProjector::default().project(&sample(), "db", 0.1, 90, now()).unwrap();
        let cpu_weeks: Vec<&TimelineEntry> = plan.timeline.iter().filter(|t| t.metric == "cpu").collect();
        assert_eq!(cpu_weeks.len(), 4);
        assert_eq!(cpu_weeks[3].week, 4);
        let expected = 50.0 * 1.1f64.powf(28.0 / 30.0);
        assert!((cpu_weeks[3].projected_value - expected).abs() < 1e-9);
        assert!((cpu_weeks[3].capacity_utilization - expected / 100.0).abs() < 1e-12);

        let short = CapacityProjector::default().project(&sample(), "db", 0.1, 6, now()).unwrap();
        assert!(short.timeline.is_empty());
    }

    #[test]
    fn unknown_source_is_not_found() {
        let err = CapacityProjector::default().project(&sample(), "cache", 0.1, 30, now()).unwrap_err();
        assert!(matches!(err, VigilError::NotFound(_)));
    }

    #[test]
    fn stale_only_source_has_empty_plan() {
        let pts = vec![point(72, "batch", "cpu", 50.0)];
        let plan = CapacityProjector::default().project(&pts, "batch", 0.1, 30, now()).unwrap();
        assert!(plan.current.is_empty());
        assert!(plan.timeline.is_empty());
    }

    #[test]
    fn rejects_bad_parameters() {
        let p = CapacityProjector::default();
        assert!(matches!(p.project(&sample(), "db", -1.0, 30, now()), Err(VigilError::InvalidInput(_))));
        assert!(matches!(p.project(&sample(), "db", f64::NAN, 30, now()), Err(VigilError::InvalidInput(_))));
        assert!(matches!(p.project(&sample(), "db", 0.1, 0, now()), Err(VigilError::InvalidInput(_))));
    }
}
