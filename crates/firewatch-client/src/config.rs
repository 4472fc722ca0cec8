//! Client configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use firewatch_types::ObserverId;

use crate::error::ClientError;

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// NATS server URL.
    pub nats_url: String,
    /// Relay `WebSocket` endpoint, without query string.
    pub relay_url: String,
    /// Id announced to the relay.
    pub observer_id: ObserverId,
    /// Emergencies file.
    pub emergencies_file: PathBuf,
    /// Bound on each `AssignEmergency` call.
    pub submit_timeout: Duration,
    /// Period of the in-progress status print.
    pub status_print_interval: Duration,
}

impl ClientConfig {
    /// Load configuration from the environment.
    ///
    /// Optional variables:
    /// - `NATS_URL` -- default `nats://localhost:4222`
    /// - `RELAY_URL` -- default `ws://localhost:8090/ws/updates`
    /// - `OBSERVER_ID` -- default `client-<random>`
    /// - `EMERGENCIES_FILE` -- default `demos/emergencies.json`
    /// - `SUBMIT_TIMEOUT_MS` -- default `180000`
    /// - `STATUS_PRINT_INTERVAL_MS` -- default `3000`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for unparsable numbers or a zero
    /// print interval.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let submit_timeout_ms = parse_ms(&lookup, "SUBMIT_TIMEOUT_MS", 180_000)?;
        let status_print_ms = parse_ms(&lookup, "STATUS_PRINT_INTERVAL_MS", 3_000)?;
        if status_print_ms == 0 {
            return Err(ClientError::Config(
                "STATUS_PRINT_INTERVAL_MS must be positive".to_owned(),
            ));
        }

        let observer_id = lookup("OBSERVER_ID").map_or_else(
            || ObserverId::new(format!("client-{}", uuid::Uuid::new_v4())),
            ObserverId::new,
        );

        Ok(Self {
            nats_url: lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_owned()),
            relay_url: lookup("RELAY_URL")
                .unwrap_or_else(|| "ws://localhost:8090/ws/updates".to_owned()),
            observer_id,
            emergencies_file: lookup("EMERGENCIES_FILE")
                .map_or_else(|| PathBuf::from("demos/emergencies.json"), PathBuf::from),
            submit_timeout: Duration::from_millis(submit_timeout_ms),
            status_print_interval: Duration::from_millis(status_print_ms),
        })
    }
}

fn parse_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<u64, ClientError> {
    lookup(name).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|e| ClientError::Config(format!("invalid {name}: {e}")))
    })
}
