//! `AssignEmergency` submission.

use std::time::Duration;

use async_nats::client::RequestErrorKind;
use async_trait::async_trait;
use firewatch_types::{AssignReply, AssignRequest, Emergency, RpcReply, subjects};
use tracing::info;

use crate::error::ClientError;

/// Something that can submit an emergency and wait for its reply.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit `emergency` and wait for the coordinator's answer.
    async fn submit(&self, emergency: Emergency) -> Result<AssignReply, ClientError>;
}

/// Submits over NATS request/reply with a per-call timeout.
#[derive(Debug, Clone)]
pub struct NatsAssignClient {
    client: async_nats::Client,
    timeout: Duration,
}

impl NatsAssignClient {
    /// Connect to NATS.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Nats`] if the connection fails.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ClientError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!(url = url, "Connected to NATS");
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Submitter for NatsAssignClient {
    async fn submit(&self, emergency: Emergency) -> Result<AssignReply, ClientError> {
        let payload = serde_json::to_vec(&AssignRequest::from(&emergency))?;
        let request = async_nats::Request::new()
            .payload(payload.into())
            .timeout(Some(self.timeout));

        let message = self
            .client
            .send_request(subjects::ASSIGN, request)
            .await
            .map_err(|e| match e.kind() {
                RequestErrorKind::TimedOut => ClientError::Timeout(self.timeout),
                RequestErrorKind::NoResponders => ClientError::Unreachable,
                RequestErrorKind::Other => ClientError::Nats(e.to_string()),
            })?;

        let reply: RpcReply<AssignReply> = serde_json::from_slice(&message.payload)?;
        reply.into_result().map_err(|failure| ClientError::Rejected {
            kind: failure.kind,
            message: failure.message,
        })
    }
}
