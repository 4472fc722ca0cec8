//! Relay binary: subscribes to the NATS status topic and serves the
//! `WebSocket` stream.

use std::sync::Arc;

use firewatch_broker::{NatsBroker, StatusFeed};
use firewatch_relay::{AppState, RelayConfig, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = RelayConfig::from_env()?;
    let addr = config.bind_addr()?;
    info!(nats_url = %config.nats_url, %addr, "firewatch-relay starting");

    let broker = NatsBroker::connect(&config.nats_url).await?;
    let feed: Arc<dyn StatusFeed> = Arc::new(broker);
    let state = Arc::new(AppState::new(feed));

    tokio::select! {
        result = start_server(addr, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }
    Ok(())
}
