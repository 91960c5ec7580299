//! Penguin species prediction service entry point

use anyhow::Result;
use penguin_ai_service::{run, ConfigManager};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting penguin prediction service v{}", env!("CARGO_PKG_VERSION"));

    let config_manager = ConfigManager::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    info!("Running in {:?} environment", config_manager.get_environment());

    if let Err(err) = run(config_manager.into_config()).await {
        error!("Service stopped: {:#}", err);
        return Err(err);
    }
    Ok(())
}

fn init_logging() {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(env)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
