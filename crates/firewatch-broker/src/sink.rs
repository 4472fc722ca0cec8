//! Publish and subscribe seams.
//!
//! The dispatch core only ever sees these traits. [`crate::NatsBroker`]
//! implements them against a NATS server and [`crate::LocalBroker`]
//! against in-process channels.

use async_trait::async_trait;
use firewatch_types::{ArchivalRecord, StatusEvent};
use futures::stream::BoxStream;

use crate::error::BrokerError;

/// Raw payloads delivered to a single subscriber, in publish order.
pub type FeedStream = BoxStream<'static, Vec<u8>>;

/// Outbound side: the fanout topic and the durable archival queue.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Publish a lifecycle event on the live status topic.
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), BrokerError>;

    /// Enqueue an archival snapshot on the durable queue.
    async fn archive(&self, record: &ArchivalRecord) -> Result<(), BrokerError>;
}

/// Inbound side of the live status topic.
#[async_trait]
pub trait StatusFeed: Send + Sync {
    /// Create a fresh, exclusive subscription.
    ///
    /// The subscription sees only events published after it was created.
    /// Dropping the stream releases the subscription.
    async fn subscribe(&self) -> Result<FeedStream, BrokerError>;
}
