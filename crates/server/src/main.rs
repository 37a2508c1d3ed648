mod api;
mod background;
mod error;
mod router;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use state::AppState;

/// Metric analytics service: forecasting, anomaly detection and capacity planning.
#[derive(Parser, Debug)]
#[command(name = "vigil-server", version, about)]
struct Cli {
    /// Bind address (overrides the HOST config key).
    #[arg(long, env = "VIGIL_HOST")]
    host: Option<String>,

    /// Listen port (overrides the PORT config key).
    #[arg(long, env = "VIGIL_PORT")]
    port: Option<u16>,

    /// Seconds between scheduled training passes; 0 disables the schedule.
    #[arg(long, env = "VIGIL_TRAINING_INTERVAL")]
    training_interval: Option<u64>,
}

fn load_config(cli: &Cli) -> vigil_core::Config {
    vigil_core::config::load_dotenv();
    let mut config = vigil_core::Config::from_env();
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(secs) = cli.training_interval {
        config.training.interval_secs = secs;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    config.validate()?;
    config.log_summary();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let interval = config.training.is_periodic().then(|| Duration::from_secs(config.training.interval_secs));

    let state = Arc::new(AppState::new(config));
    if let Some(interval) = interval {
        tokio::spawn(background::training_loop(state.clone(), interval));
    }

    let app = router::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
