use vigil_compute::AnalyticsEngine;
use vigil_core::Config;

/// Shared application state handed to every handler.
pub struct AppState {
    pub engine: AnalyticsEngine,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let engine = AnalyticsEngine::new(&config.engine, &config.training);
        Self { engine, config }
    }
}
