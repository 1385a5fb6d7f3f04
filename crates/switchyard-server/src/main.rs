//! # Switchyard Server
//!
//! Websocket event relay built on the Switchyard router.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! switchyard
//!
//! # Run with a specific config file
//! SWITCHYARD_CONFIG=/path/to/switchyard.toml switchyard
//!
//! # Run with environment variables
//! SWITCHYARD_PORT=8080 SWITCHYARD_HOST=0.0.0.0 switchyard
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "switchyard=debug,switchyard_core=debug,switchyard_relay=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting Switchyard server on {}:{}",
        config.host,
        config.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
