//! Patchbay tracker binary.
//!
//! Runs the tracker service that brokers worker endpoints to prioritised
//! client requests.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use tracing::info;
use tracing_subscriber::EnvFilter;

use patchbay_tracker::TrackerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("patchbay_tracker=info".parse()?),
        )
        .init();

    // Load configuration
    let config: TrackerConfig = Figment::new()
        .merge(Toml::file("patchbay.toml"))
        .merge(Env::prefixed("PATCHBAY_"))
        .extract()?;

    info!(
        host = %config.host,
        port = config.port,
        port_end = config.port_end,
        "Configuration loaded"
    );

    let port = patchbay_tracker::start(config).await?;
    info!(port, "Tracker ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    patchbay_tracker::terminate().await;

    Ok(())
}
