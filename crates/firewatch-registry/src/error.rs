//! Error types for the registry.

/// Errors that can occur while reading or writing responder records.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The responder is not registered.
    #[error("Responder not found: {0}")]
    NotFound(String),

    /// A stored value is not in the expected shape.
    #[error("Corrupt record for {key}: {reason}")]
    Corrupt {
        /// The offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
