//! Operator client binary.
//!
//! Usage: `firewatch-client [EMERGENCIES_FILE]`. The path argument
//! overrides `EMERGENCIES_FILE`; everything else comes from the
//! environment (see [`ClientConfig::from_env`]).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use firewatch_client::input::load_emergencies;
use firewatch_client::{ClientConfig, NatsAssignClient, OutcomeKind, Submitter, run_session, stream};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let mut config = ClientConfig::from_env().context("loading client configuration")?;
    if let Some(path) = std::env::args().nth(1) {
        config.emergencies_file = PathBuf::from(path);
    }

    let emergencies = load_emergencies(&config.emergencies_file)
        .with_context(|| format!("loading {}", config.emergencies_file.display()))?;
    info!(
        count = emergencies.len(),
        observer_id = %config.observer_id,
        "Loaded emergencies"
    );

    let (mut events, reader) = stream::connect(&config.relay_url, &config.observer_id)
        .await
        .context("connecting to the status relay")?;
    let submitter: Arc<dyn Submitter> = Arc::new(
        NatsAssignClient::connect(&config.nats_url, config.submit_timeout)
            .await
            .context("connecting to NATS")?,
    );

    let outcomes = run_session(
        emergencies,
        &mut events,
        submitter,
        config.status_print_interval,
    )
    .await;
    reader.abort();

    let extinguished = outcomes
        .iter()
        .filter(|o| matches!(o.kind, OutcomeKind::Extinguished { .. }))
        .count();
    info!(
        total = outcomes.len(),
        extinguished,
        failed = outcomes.len().saturating_sub(extinguished),
        "All emergencies processed"
    );
    Ok(())
}
