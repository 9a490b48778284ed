//! Horde Hub
//!
//! Runs the authoritative synchronization hub. Configuration comes from
//! `HORDE_*` environment variables; logging from `RUST_LOG`.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use horde::{hub::HubConfig, network::HubServer, VERSION};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = HubConfig::from_env()?;
    info!("Horde Hub v{}", VERSION);
    info!(
        "Arena {}x{}, pool of {} hostiles, idle tick every {:?}",
        config.bounds.width, config.bounds.height, config.hostile_pool, config.idle_tick_interval
    );

    let server = Arc::new(HubServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    info!("Hub stopped");
    Ok(())
}
