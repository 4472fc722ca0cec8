//! Dispatch service binary.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `firewatch-config.yaml` (or `FIREWATCH_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to NATS and Dragonfly, ensure the archival stream exists
//! 4. Register any configured fleet members the registry does not know
//! 5. Start the configured roles: executor, coordinator, archiver
//! 6. Run until Ctrl-C or until a role exits

use std::path::PathBuf;
use std::sync::Arc;

use firewatch_broker::{
    DeliveryFailure, EventEmitter, IncidentArchive, NatsBroker, StatusSink,
};
use firewatch_dispatch::archive_store::DragonflyIncidentStore;
use firewatch_dispatch::config::DispatchConfig;
use firewatch_dispatch::rpc::{self, ExecutorClient, NatsExecutorClient};
use firewatch_dispatch::{AssignmentCoordinator, ResponseExecutor, Role};
use firewatch_registry::{DragonflyRegistry, ResponderRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "firewatch-config.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str())),
        )
        .with_target(true)
        .init();

    info!(
        roles = ?config.dispatch.roles,
        lock_scope = ?config.coordinator.lock_scope,
        executor_timeout_ms = config.coordinator.executor_timeout_ms,
        "firewatch-dispatch starting"
    );

    let broker = NatsBroker::connect(&config.infrastructure.nats_url).await?;
    broker.ensure_archive_stream().await?;
    let dragonfly = Arc::new(DragonflyRegistry::connect(&config.infrastructure.dragonfly_url).await?);
    let registry: Arc<dyn ResponderRegistry> = Arc::clone(&dragonfly) as Arc<dyn ResponderRegistry>;

    seed_fleet(registry.as_ref(), &config).await?;

    let sink: Arc<dyn StatusSink> = Arc::new(broker.clone());
    let mut tasks: JoinSet<(&'static str, Result<(), String>)> = JoinSet::new();
    let roles = &config.dispatch.roles;

    if roles.contains(&Role::Executor) {
        let emitter = spawn_emitter(Arc::clone(&sink), &mut tasks);
        let executor = Arc::new(ResponseExecutor::new(
            Arc::clone(&registry),
            emitter,
            config.executor_settings()?,
        ));
        let client = broker.client().clone();
        tasks.spawn(async move {
            let result = rpc::serve_execute(client, executor).await;
            ("executor", result.map_err(|e| e.to_string()))
        });
    }

    if roles.contains(&Role::Coordinator) {
        let archive = config
            .coordinator
            .archive_in_progress
            .then(|| spawn_emitter(Arc::clone(&sink), &mut tasks));
        let executor_client: Arc<dyn ExecutorClient> =
            Arc::new(NatsExecutorClient::new(broker.client().clone()));
        let coordinator = AssignmentCoordinator::new(
            Arc::clone(&registry),
            executor_client,
            archive,
            config.coordinator_settings(),
        );
        let client = broker.client().clone();
        tasks.spawn(async move {
            let result = rpc::serve_assign(client, coordinator).await;
            ("coordinator", result.map_err(|e| e.to_string()))
        });
    }

    if roles.contains(&Role::Archiver) {
        let broker = broker.clone();
        let archive = IncidentArchive::new(Arc::new(DragonflyIncidentStore::new(Arc::clone(
            &dragonfly,
        ))));
        tasks.spawn(async move {
            let result = broker.run_archiver(&archive).await;
            ("archiver", result.map_err(|e| e.to_string()))
        });
    }

    if tasks.is_empty() {
        warn!("No roles configured, exiting");
        return Ok(());
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        Some(joined) = tasks.join_next() => {
            match joined {
                Ok((role, Ok(()))) => info!(role, "Role finished"),
                Ok((role, Err(e))) => error!(role, error = %e, "Role failed"),
                Err(e) => error!(error = %e, "Role task panicked"),
            }
        }
    }

    tasks.shutdown().await;
    info!("firewatch-dispatch stopped");
    Ok(())
}

/// Load configuration from `FIREWATCH_CONFIG` or the default path,
/// falling back to defaults if the file does not exist.
fn load_config() -> Result<DispatchConfig, Box<dyn std::error::Error>> {
    let path = std::env::var("FIREWATCH_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        Ok(DispatchConfig::from_file(&path)?)
    } else {
        let mut config = DispatchConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// Register configured responders that the registry has not seen.
async fn seed_fleet(
    registry: &dyn ResponderRegistry,
    config: &DispatchConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut added: usize = 0;
    for responder in config.fleet_responders() {
        if registry.find_by_id(&responder.id).await?.is_none() {
            info!(responder_id = %responder.id, "Registering fleet responder");
            registry.register(responder).await?;
            added = added.saturating_add(1);
        }
    }
    if added > 0 {
        info!(added, "Fleet seeded");
    }
    Ok(())
}

/// Start an emitter and a task that counts its delivery failures.
fn spawn_emitter(
    sink: Arc<dyn StatusSink>,
    tasks: &mut JoinSet<(&'static str, Result<(), String>)>,
) -> EventEmitter {
    let (emitter, failures, _drain) = EventEmitter::spawn(sink);
    tasks.spawn(async move {
        count_failures(failures).await;
        ("emitter", Ok(()))
    });
    emitter
}

async fn count_failures(mut failures: mpsc::Receiver<DeliveryFailure>) {
    let mut total: u64 = 0;
    while let Some(failure) = failures.recv().await {
        total = total.saturating_add(1);
        warn!(target_kind = ?failure.target, total, "Broker delivery failure");
    }
}
