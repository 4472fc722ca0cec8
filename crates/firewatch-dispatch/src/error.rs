//! Error taxonomy for assignment and execution.
//!
//! [`DispatchError`] is what both the coordinator and the executor
//! return. It maps onto the wire [`FailureKind`] so RPC callers see the
//! same distinctions as in-process callers.

use std::time::Duration;

use firewatch_registry::RegistryError;
use firewatch_types::{FailureKind, InvalidEmergency, ResponderId, RpcFailure};

/// Errors raised while assigning or executing a response.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No responder was available when the emergency was evaluated.
    #[error("no responder is available")]
    NoResponderAvailable,

    /// The executor was asked to dispatch an unregistered responder.
    #[error("responder not found: {0}")]
    ResponderNotFound(ResponderId),

    /// The executor could not be reached at all.
    #[error("executor unreachable: {0}")]
    ExecutorUnreachable(String),

    /// The executor did not reply within the configured bound.
    #[error("executor did not reply within {0:?}")]
    ExecutorTimeout(Duration),

    /// The executor replied with a failure.
    #[error("executor failed ({kind:?}): {message}")]
    ExecutorError {
        /// Failure kind reported by the executor.
        kind: FailureKind,
        /// Executor's description.
        message: String,
    },

    /// The emergency failed validation.
    #[error(transparent)]
    InvalidEmergency(#[from] InvalidEmergency),

    /// Registry read or write failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Messaging failure other than unreachable/timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Task or arithmetic failure inside the service.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Wire classification of this error.
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NoResponderAvailable => FailureKind::NoResponderAvailable,
            Self::ResponderNotFound(_) => FailureKind::ResponderNotFound,
            Self::ExecutorUnreachable(_) => FailureKind::ExecutorUnreachable,
            Self::ExecutorTimeout(_) => FailureKind::ExecutorTimeout,
            Self::ExecutorError { .. } => FailureKind::ExecutorError,
            Self::InvalidEmergency(_) => FailureKind::InvalidRequest,
            Self::Registry(_) | Self::Transport(_) | Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Build the RPC failure payload for this error.
    pub fn to_failure(&self) -> RpcFailure {
        RpcFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }

    /// Wrap a failure the executor reported over RPC.
    pub fn from_executor_failure(failure: RpcFailure) -> Self {
        Self::ExecutorError {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            DispatchError::NoResponderAvailable.kind(),
            FailureKind::NoResponderAvailable
        );
        assert_eq!(
            DispatchError::ResponderNotFound(ResponderId::new("x")).kind(),
            FailureKind::ResponderNotFound
        );
        assert_eq!(
            DispatchError::ExecutorTimeout(Duration::from_secs(1)).kind(),
            FailureKind::ExecutorTimeout
        );
        assert_eq!(
            DispatchError::Internal("boom".into()).kind(),
            FailureKind::Internal
        );
    }

    #[test]
    fn executor_failure_wraps_remote_kind() {
        let err = DispatchError::from_executor_failure(RpcFailure {
            kind: FailureKind::ResponderNotFound,
            message: "responder not found: ghost".into(),
        });
        assert_eq!(err.kind(), FailureKind::ExecutorError);
        assert!(err.to_string().contains("ghost"));
    }
}
