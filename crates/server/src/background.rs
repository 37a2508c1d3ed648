use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use vigil_compute::TrainingStatus;

use crate::state::AppState;

/// Trigger a training pass every `interval`. The first pass fires one full
/// interval after startup; a tick that lands while a pass is still running
/// is skipped.
pub(crate) async fn training_loop(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "periodic training enabled");
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let ack = state.engine.trigger_training();
        match ack.status {
            TrainingStatus::Started => debug!("scheduled training pass started"),
            TrainingStatus::AlreadyRunning => debug!("scheduled training skipped, pass still running"),
        }
    }
}
