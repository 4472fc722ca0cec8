//! Error types for the operator client.

use std::path::PathBuf;
use std::time::Duration;

use firewatch_types::FailureKind;

/// Errors raised by the operator client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The emergencies file could not be read.
    #[error("failed to read {path}: {source}")]
    Input {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The emergencies file is not valid.
    #[error("invalid emergencies file: {0}")]
    Parse(String),

    /// The relay stream could not be opened.
    #[error("relay stream error: {0}")]
    Stream(String),

    /// NATS connection or request failure.
    #[error("NATS error: {0}")]
    Nats(String),

    /// No coordinator is listening.
    #[error("coordinator unreachable")]
    Unreachable,

    /// The submission was not answered in time.
    #[error("submission timed out after {0:?}")]
    Timeout(Duration),

    /// The coordinator answered with a failure.
    #[error("assignment rejected ({kind:?}): {message}")]
    Rejected {
        /// Failure category.
        kind: FailureKind,
        /// Coordinator's description.
        message: String,
    },

    /// Serialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
