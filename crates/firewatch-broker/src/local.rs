//! In-process broker.
//!
//! The fanout topic is a [`broadcast`] channel of encoded payloads, so
//! subscribers see exactly what a network subscriber would: raw bytes
//! that still need decoding. The most recent published events and
//! archival records are also kept for inspection, up to a fixed limit, so
//! a long single-node run holds a bounded amount of history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use firewatch_types::{ArchivalRecord, StatusEvent};
use futures::StreamExt as _;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::error::BrokerError;
use crate::sink::{FeedStream, StatusFeed, StatusSink};

/// Capacity of the fanout channel. A subscriber that falls further
/// behind skips ahead to the newest payloads.
const FANOUT_CAPACITY: usize = 1024;

/// Entries kept in each history list by [`LocalBroker::new`].
pub const DEFAULT_HISTORY_LIMIT: usize = 4096;

/// Append `item`, dropping the oldest entries beyond `limit`.
fn push_bounded<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    history.push_back(item);
    while history.len() > limit {
        history.pop_front();
    }
}

/// Broker backed by in-process channels.
#[derive(Debug)]
pub struct LocalBroker {
    fanout: broadcast::Sender<Vec<u8>>,
    published: Mutex<VecDeque<StatusEvent>>,
    archived: Mutex<VecDeque<ArchivalRecord>>,
    history_limit: usize,
    status_unavailable: AtomicBool,
    archive_unavailable: AtomicBool,
}

impl LocalBroker {
    /// Create a broker with no subscribers.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create a broker that keeps at most `limit` events and `limit`
    /// archival records.
    pub fn with_history_limit(limit: usize) -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            fanout,
            published: Mutex::new(VecDeque::new()),
            archived: Mutex::new(VecDeque::new()),
            history_limit: limit,
            status_unavailable: AtomicBool::new(false),
            archive_unavailable: AtomicBool::new(false),
        }
    }

    /// Retained status events, oldest first.
    pub async fn published(&self) -> Vec<StatusEvent> {
        self.published.lock().await.iter().cloned().collect()
    }

    /// Retained archival records, oldest first.
    pub async fn archived(&self) -> Vec<ArchivalRecord> {
        self.archived.lock().await.iter().cloned().collect()
    }

    /// Number of live fanout subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.receiver_count()
    }

    /// Push an arbitrary payload to every subscriber, bypassing encoding.
    pub fn publish_raw(&self, payload: Vec<u8>) -> usize {
        self.fanout.send(payload).unwrap_or(0)
    }

    /// Make status publishes fail with [`BrokerError::Unavailable`].
    pub fn set_status_unavailable(&self, unavailable: bool) {
        self.status_unavailable.store(unavailable, Ordering::Release);
    }

    /// Make archival publishes fail with [`BrokerError::Unavailable`].
    pub fn set_archive_unavailable(&self, unavailable: bool) {
        self.archive_unavailable.store(unavailable, Ordering::Release);
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSink for LocalBroker {
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), BrokerError> {
        if self.status_unavailable.load(Ordering::Acquire) {
            return Err(BrokerError::Unavailable(String::from("status topic offline")));
        }
        let payload = event.encode()?;
        push_bounded(
            &mut *self.published.lock().await,
            event.clone(),
            self.history_limit,
        );
        // Zero receivers is normal when no observer is connected.
        let delivered = self.fanout.send(payload).unwrap_or(0);
        debug!(delivered, state = %event.state, "local fanout");
        Ok(())
    }

    async fn archive(&self, record: &ArchivalRecord) -> Result<(), BrokerError> {
        if self.archive_unavailable.load(Ordering::Acquire) {
            return Err(BrokerError::Unavailable(String::from("archive queue offline")));
        }
        push_bounded(
            &mut *self.archived.lock().await,
            record.clone(),
            self.history_limit,
        );
        Ok(())
    }
}

#[async_trait]
impl StatusFeed for LocalBroker {
    async fn subscribe(&self) -> Result<FeedStream, BrokerError> {
        let rx = self.fanout.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "local subscriber lagged, skipping ahead");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use firewatch_types::{LifecycleState, ResponderId};

    use super::*;

    fn event(state: LifecycleState) -> StatusEvent {
        StatusEvent {
            incident_id: None,
            sequence: 0,
            responder_id: ResponderId::new("d1"),
            state,
            location_label: String::from("Valle"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let broker = LocalBroker::new();
        let mut first = broker.subscribe().await.unwrap();
        let mut second = broker.subscribe().await.unwrap();
        assert_eq!(broker.subscriber_count(), 2);

        broker.publish_status(&event(LifecycleState::Assigned)).await.unwrap();

        let a = StatusEvent::decode(&first.next().await.unwrap()).unwrap();
        let b = StatusEvent::decode(&second.next().await.unwrap()).unwrap();
        assert_eq!(a.state, LifecycleState::Assigned);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn late_subscriber_sees_no_backlog() {
        let broker = LocalBroker::new();
        broker.publish_status(&event(LifecycleState::Assigned)).await.unwrap();
        let mut late = broker.subscribe().await.unwrap();
        broker.publish_status(&event(LifecycleState::EnRoute)).await.unwrap();

        let got = StatusEvent::decode(&late.next().await.unwrap()).unwrap();
        assert_eq!(got.state, LifecycleState::EnRoute);
    }

    #[tokio::test]
    async fn history_keeps_only_the_newest_entries() {
        let broker = LocalBroker::with_history_limit(2);
        for state in [
            LifecycleState::Assigned,
            LifecycleState::EnRoute,
            LifecycleState::Suppressing,
        ] {
            broker.publish_status(&event(state)).await.unwrap();
        }
        let kept: Vec<_> = broker.published().await.into_iter().map(|e| e.state).collect();
        assert_eq!(kept, vec![LifecycleState::EnRoute, LifecycleState::Suppressing]);
    }

    #[tokio::test]
    async fn dropping_a_stream_releases_the_subscription() {
        let broker = LocalBroker::new();
        let stream = broker.subscribe().await.unwrap();
        assert_eq!(broker.subscriber_count(), 1);
        drop(stream);
        assert_eq!(broker.subscriber_count(), 0);
    }
}
