//! Error types for broker operations.

/// Errors that can occur while publishing to or consuming from the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Failed to connect to or communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// The broker refused or dropped the operation.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A payload could not be encoded or decoded.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An archive store write failed.
    #[error("archive store error: {0}")]
    Store(String),
}
