//! Request/reply plumbing for `AssignEmergency` and `ExecuteResponse`.
//!
//! The coordinator talks to the executor through the [`ExecutorClient`]
//! seam. [`NatsExecutorClient`] crosses the network; [`LocalExecutorClient`]
//! calls an in-process [`ResponseExecutor`]. Either way the call is
//! bounded by the caller's timeout and never cancels a running executor.
//!
//! [`serve_assign`] and [`serve_execute`] are the service loops. Each
//! request is handled on its own task so a long dispatch does not hold
//! up the subscription.

use std::sync::Arc;
use std::time::Duration;

use async_nats::client::RequestErrorKind;
use async_trait::async_trait;
use firewatch_types::{
    AssignReply, AssignRequest, ExecuteReply, ExecuteRequest, FailureKind, RpcReply, subjects,
};
use futures::StreamExt as _;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coordinator::AssignmentCoordinator;
use crate::error::DispatchError;
use crate::executor::ResponseExecutor;

/// Queue group shared by coordinator replicas.
const COORDINATOR_QUEUE: &str = "firewatch-coordinators";
/// Queue group shared by executor replicas.
const EXECUTOR_QUEUE: &str = "firewatch-executors";

/// The coordinator's view of the response executor.
///
/// Implementations must return within `timeout` (with
/// [`DispatchError::ExecutorTimeout`] if the executor has not replied)
/// and must leave a still-running executor alone when they do.
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// Ask the executor to run `request`.
    async fn execute(
        &self,
        request: ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteReply, DispatchError>;
}

/// Calls an executor living in the same process.
#[derive(Debug, Clone)]
pub struct LocalExecutorClient {
    executor: Arc<ResponseExecutor>,
}

impl LocalExecutorClient {
    /// Wrap an executor.
    pub const fn new(executor: Arc<ResponseExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ExecutorClient for LocalExecutorClient {
    async fn execute(
        &self,
        request: ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteReply, DispatchError> {
        let executor = Arc::clone(&self.executor);
        // Detached so a timeout here leaves the dispatch running.
        let handle = tokio::spawn(async move { executor.execute(request).await });
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result
                .map(|final_state| ExecuteReply { final_state })
                .map_err(|e| DispatchError::from_executor_failure(e.to_failure())),
            Ok(Err(join)) => Err(DispatchError::Internal(format!(
                "executor task failed: {join}"
            ))),
            Err(_) => Err(DispatchError::ExecutorTimeout(timeout)),
        }
    }
}

/// Calls a remote executor over NATS request/reply.
#[derive(Debug, Clone)]
pub struct NatsExecutorClient {
    client: async_nats::Client,
}

impl NatsExecutorClient {
    /// Wrap a connected NATS client.
    pub const fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutorClient for NatsExecutorClient {
    async fn execute(
        &self,
        request: ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteReply, DispatchError> {
        let payload = serde_json::to_vec(&request)
            .map_err(|e| DispatchError::Transport(format!("failed to encode request: {e}")))?;
        let nats_request = async_nats::Request::new()
            .payload(payload.into())
            .timeout(Some(timeout));

        let message = self
            .client
            .send_request(subjects::EXECUTE, nats_request)
            .await
            .map_err(|e| match e.kind() {
                RequestErrorKind::TimedOut => DispatchError::ExecutorTimeout(timeout),
                RequestErrorKind::NoResponders => {
                    DispatchError::ExecutorUnreachable("no executor is listening".to_owned())
                }
                RequestErrorKind::Other => DispatchError::ExecutorUnreachable(e.to_string()),
            })?;

        let reply: RpcReply<ExecuteReply> = serde_json::from_slice(&message.payload)
            .map_err(|e| DispatchError::Transport(format!("malformed executor reply: {e}")))?;
        reply
            .into_result()
            .map_err(DispatchError::from_executor_failure)
    }
}

/// Serve `AssignEmergency` until the subscription ends.
///
/// # Errors
///
/// Returns [`DispatchError::Transport`] if the subscription cannot be
/// created.
pub async fn serve_assign(
    client: async_nats::Client,
    coordinator: AssignmentCoordinator,
) -> Result<(), DispatchError> {
    let mut subscription = client
        .queue_subscribe(subjects::ASSIGN, COORDINATOR_QUEUE.to_owned())
        .await
        .map_err(|e| DispatchError::Transport(format!("failed to subscribe to assign: {e}")))?;
    info!(subject = subjects::ASSIGN, "Coordinator listening");

    while let Some(message) = subscription.next().await {
        let Some(reply_to) = message.reply.clone() else {
            warn!("Assign request without reply subject, ignoring");
            continue;
        };
        let client = client.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let reply: RpcReply<AssignReply> =
                match serde_json::from_slice::<AssignRequest>(&message.payload) {
                    Ok(request) => match coordinator.assign(request.into_emergency()).await {
                        Ok(assigned) => RpcReply::Ok(assigned),
                        Err(e) => RpcReply::Error(e.to_failure()),
                    },
                    Err(e) => RpcReply::failure(
                        FailureKind::InvalidRequest,
                        format!("malformed assign request: {e}"),
                    ),
                };
            respond(&client, reply_to, &reply).await;
        });
    }
    Ok(())
}

/// Serve `ExecuteResponse` until the subscription ends.
///
/// # Errors
///
/// Returns [`DispatchError::Transport`] if the subscription cannot be
/// created.
pub async fn serve_execute(
    client: async_nats::Client,
    executor: Arc<ResponseExecutor>,
) -> Result<(), DispatchError> {
    let mut subscription = client
        .queue_subscribe(subjects::EXECUTE, EXECUTOR_QUEUE.to_owned())
        .await
        .map_err(|e| DispatchError::Transport(format!("failed to subscribe to execute: {e}")))?;
    info!(subject = subjects::EXECUTE, "Executor listening");

    while let Some(message) = subscription.next().await {
        let Some(reply_to) = message.reply.clone() else {
            warn!("Execute request without reply subject, ignoring");
            continue;
        };
        let client = client.clone();
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            let reply: RpcReply<ExecuteReply> =
                match serde_json::from_slice::<ExecuteRequest>(&message.payload) {
                    Ok(request) => match executor.execute(request).await {
                        Ok(final_state) => RpcReply::Ok(ExecuteReply { final_state }),
                        Err(e) => RpcReply::Error(e.to_failure()),
                    },
                    Err(e) => RpcReply::failure(
                        FailureKind::InvalidRequest,
                        format!("malformed execute request: {e}"),
                    ),
                };
            respond(&client, reply_to, &reply).await;
        });
    }
    Ok(())
}

async fn respond<T: Serialize + Sync>(
    client: &async_nats::Client,
    reply_to: async_nats::Subject,
    reply: &RpcReply<T>,
) {
    let payload = match serde_json::to_vec(reply) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to encode reply");
            return;
        }
    };
    if let Err(e) = client.publish(reply_to.clone(), payload.into()).await {
        // The caller may have timed out and gone away.
        debug!(subject = %reply_to, error = %e, "Failed to publish reply");
    }
}
