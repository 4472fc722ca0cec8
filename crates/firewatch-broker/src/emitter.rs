//! Ordered, fire-and-forget event emission.
//!
//! [`EventEmitter::spawn`] starts one background task per emitter. Every
//! call to [`EventEmitter::status`] or [`EventEmitter::archive`] enqueues
//! without waiting; the task publishes items strictly in enqueue order.
//! Failed publishes are logged and reported on the returned error
//! channel, which callers may ignore.

use std::sync::Arc;

use firewatch_types::{ArchivalRecord, StatusEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::sink::StatusSink;

/// Capacity of the delivery-failure channel. Failures beyond this are
/// only logged.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

enum Outbound {
    Status(StatusEvent),
    Archive(ArchivalRecord),
    Flush(oneshot::Sender<()>),
}

/// Which primitive a failed delivery targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// The live status fanout topic.
    Status,
    /// The durable archival queue.
    Archive,
}

/// A publish that did not reach the broker.
#[derive(Debug)]
pub struct DeliveryFailure {
    /// Where the item was headed.
    pub target: DeliveryTarget,
    /// Why it failed.
    pub error: BrokerError,
}

/// Cheaply cloneable handle to an emitter task.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl EventEmitter {
    /// Spawn the emitter task draining into `sink`.
    ///
    /// Returns the handle, the receiving end of the failure channel, and
    /// the task's join handle. The task exits once every handle clone has
    /// been dropped and the queue is drained.
    pub fn spawn(
        sink: Arc<dyn StatusSink>,
    ) -> (Self, mpsc::Receiver<DeliveryFailure>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = mpsc::channel(FAILURE_CHANNEL_CAPACITY);
        let task = tokio::spawn(drain(rx, sink, failure_tx));
        (Self { tx }, failure_rx, task)
    }

    /// Queue a lifecycle event for the live status topic.
    pub fn status(&self, event: StatusEvent) {
        if self.tx.send(Outbound::Status(event)).is_err() {
            warn!("emitter task has stopped, dropping status event");
        }
    }

    /// Queue an archival snapshot for the durable queue.
    pub fn archive(&self, record: ArchivalRecord) {
        if self.tx.send(Outbound::Archive(record)).is_err() {
            warn!("emitter task has stopped, dropping archival record");
        }
    }

    /// Wait until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Outbound::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    sink: Arc<dyn StatusSink>,
    failures: mpsc::Sender<DeliveryFailure>,
) {
    while let Some(item) = rx.recv().await {
        let (target, result) = match item {
            Outbound::Status(event) => {
                debug!(
                    responder_id = %event.responder_id,
                    state = %event.state,
                    sequence = event.sequence,
                    "publishing status event"
                );
                (DeliveryTarget::Status, sink.publish_status(&event).await)
            }
            Outbound::Archive(record) => {
                debug!(
                    incident_id = %record.incident_id,
                    stage = ?record.stage,
                    "publishing archival record"
                );
                (DeliveryTarget::Archive, sink.archive(&record).await)
            }
            Outbound::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        if let Err(error) = result {
            warn!(target = ?target, error = %error, "best-effort publish failed");
            let _ = failures.try_send(DeliveryFailure { target, error });
        }
    }
    debug!("emitter queue closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use firewatch_types::{LifecycleState, ResponderId};

    use super::*;
    use crate::local::LocalBroker;

    fn event(sequence: u32, state: LifecycleState) -> StatusEvent {
        StatusEvent {
            incident_id: None,
            sequence,
            responder_id: ResponderId::new("d1"),
            state,
            location_label: String::from("Cerro"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publishes_in_enqueue_order() {
        let broker = Arc::new(LocalBroker::new());
        let (emitter, _failures, _task) = EventEmitter::spawn(broker.clone());

        emitter.status(event(0, LifecycleState::Assigned));
        emitter.status(event(1, LifecycleState::EnRoute));
        emitter.status(event(2, LifecycleState::Suppressing));
        emitter.flush().await;

        let sequences: Vec<u32> = broker.published().await.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let broker = Arc::new(LocalBroker::new());
        broker.set_status_unavailable(true);
        let (emitter, mut failures, _task) = EventEmitter::spawn(broker.clone());

        emitter.status(event(0, LifecycleState::Assigned));
        emitter.flush().await;

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.target, DeliveryTarget::Status);
        assert!(matches!(failure.error, BrokerError::Unavailable(_)));
        assert!(broker.published().await.is_empty());
    }

    #[tokio::test]
    async fn task_exits_when_handles_drop() {
        let broker = Arc::new(LocalBroker::new());
        let (emitter, _failures, task) = EventEmitter::spawn(broker);
        drop(emitter);
        assert!(task.await.is_ok());
    }
}
