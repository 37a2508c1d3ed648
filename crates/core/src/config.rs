use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VigilError};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub training: TrainingConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p),
            training: TrainingConfig::from_env_profiled(p),
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        let zero = [
            ("STORE_CAPACITY", engine.store_capacity),
            ("FORECAST_WINDOW", engine.forecast_window),
            ("FORECAST_TREES", engine.forecast_trees),
            ("ANOMALY_TREES", engine.anomaly_trees),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);
        if let Some((key, _)) = zero {
            return Err(VigilError::Config(format!("{key} must be at least 1")));
        }
        if engine.min_training_points <= engine.forecast_window {
            return Err(VigilError::Config(format!(
                "MIN_TRAINING_POINTS ({}) must exceed FORECAST_WINDOW ({})",
                engine.min_training_points, engine.forecast_window
            )));
        }
        if !engine.base_monthly_cost.is_finite() || engine.base_monthly_cost < 0.0 {
            return Err(VigilError::Config(format!(
                "BASE_MONTHLY_COST must be a non-negative number, got {}",
                engine.base_monthly_cost
            )));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  engine:    capacity={}, window={}, min_points={}/{}",
            self.engine.store_capacity,
            self.engine.forecast_window,
            self.engine.min_training_points,
            self.engine.min_anomaly_points
        );
        tracing::info!(
            "  forests:   forecast_trees={}, anomaly_trees={}",
            self.engine.forecast_trees,
            self.engine.anomaly_trees
        );
        tracing::info!(
            "  training:  interval={}s, series_timeout={}s",
            self.training.interval_secs,
            self.training.series_timeout_secs
        );
    }

    /// Return a view safe for API responses.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "engine": {
                "store_capacity": self.engine.store_capacity,
                "forecast_window": self.engine.forecast_window,
                "min_training_points": self.engine.min_training_points,
                "min_anomaly_points": self.engine.min_anomaly_points,
            },
            "training": {
                "interval_secs": self.training.interval_secs,
                "series_timeout_secs": self.training.series_timeout_secs,
                "periodic": self.training.is_periodic(),
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 8090),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8090,
            cors_origin: "*".into(),
        }
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of points retained by the metric store.
    pub store_capacity: usize,
    /// Trailing values used as regression input (W).
    pub forecast_window: usize,
    /// Points a series needs before any model is trained.
    pub min_training_points: usize,
    /// Points the anomaly model needs to fit.
    pub min_anomaly_points: usize,
    pub forecast_trees: usize,
    pub anomaly_trees: usize,
    /// Base monthly cost used by capacity cost estimates.
    pub base_monthly_cost: f64,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            store_capacity: profiled_env_parse(p, "STORE_CAPACITY", d.store_capacity),
            forecast_window: profiled_env_parse(p, "FORECAST_WINDOW", d.forecast_window),
            min_training_points: profiled_env_parse(p, "MIN_TRAINING_POINTS", d.min_training_points),
            min_anomaly_points: profiled_env_parse(p, "MIN_ANOMALY_POINTS", d.min_anomaly_points),
            forecast_trees: profiled_env_parse(p, "FORECAST_TREES", d.forecast_trees),
            anomaly_trees: profiled_env_parse(p, "ANOMALY_TREES", d.anomaly_trees),
            base_monthly_cost: profiled_env_parse(p, "BASE_MONTHLY_COST", d.base_monthly_cost),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_capacity: 10_000,
            forecast_window: 10,
            min_training_points: 20,
            min_anomaly_points: 10,
            forecast_trees: 100,
            anomaly_trees: 100,
            base_monthly_cost: 1000.0,
        }
    }
}

// ── Training ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seconds between scheduled training passes (0 disables the schedule).
    pub interval_secs: u64,
    /// Wall-clock budget for fitting one series.
    pub series_timeout_secs: u64,
}

impl TrainingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            interval_secs: profiled_env_parse(p, "TRAINING_INTERVAL_SECS", d.interval_secs),
            series_timeout_secs: profiled_env_parse(
                p,
                "TRAINING_SERIES_TIMEOUT_SECS",
                d.series_timeout_secs,
            ),
        }
    }

    pub fn is_periodic(&self) -> bool {
        self.interval_secs > 0
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            series_timeout_secs: 30,
        }
    }
}
