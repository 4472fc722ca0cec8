//! NATS broker: core subjects for fanout and JetStream for the durable
//! archival queue.
//!
//! # Subject Convention
//!
//! - **Live status:** `firewatch.status` -- every core NATS subscription
//!   receives its own copy; dropping the subscriber unsubscribes
//! - **Archival:** `firewatch.archive` -- captured by the
//!   `FIREWATCH_ARCHIVE` work-queue stream and consumed by the durable
//!   `archiver` pull consumer

use async_nats::jetstream::{self, consumer, stream};
use async_trait::async_trait;
use firewatch_types::{ArchivalRecord, StatusEvent, subjects};
use futures::StreamExt as _;
use tracing::{debug, info, warn};

use crate::archive::IncidentArchive;
use crate::error::BrokerError;
use crate::sink::{FeedStream, StatusFeed, StatusSink};

/// NATS connection shared by every broker role.
#[derive(Clone)]
pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsBroker {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrokerError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self::from_client(client))
    }

    /// Wrap an already connected client.
    pub fn from_client(client: async_nats::Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    /// The underlying core NATS client, for request/reply.
    pub const fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Create the archival stream if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Nats`] if JetStream rejects the request.
    pub async fn ensure_archive_stream(&self) -> Result<stream::Stream, BrokerError> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: subjects::ARCHIVE_STREAM.to_owned(),
                subjects: vec![subjects::ARCHIVE.to_owned()],
                retention: stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                BrokerError::Nats(format!(
                    "failed to create stream {}: {e}",
                    subjects::ARCHIVE_STREAM
                ))
            })
    }

    /// Consume the archival queue until the connection closes.
    ///
    /// Each record is merged into its stored entry through `archive`.
    /// Messages are acknowledged after handling; malformed records are
    /// acknowledged and dropped. Store failures are logged and the message
    /// is left unacknowledged for redelivery.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Nats`] if the consumer cannot be created.
    pub async fn run_archiver(
        &self,
        archive: &IncidentArchive,
    ) -> Result<(), BrokerError> {
        let stream = self.ensure_archive_stream().await?;
        let consumer = stream
            .get_or_create_consumer(
                subjects::ARCHIVE_CONSUMER,
                consumer::pull::Config {
                    durable_name: Some(subjects::ARCHIVE_CONSUMER.to_owned()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Nats(format!("failed to create archive consumer: {e}")))?;
        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Nats(format!("failed to open archive stream: {e}")))?;
        info!("archiver consuming {}", subjects::ARCHIVE);

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "archive delivery error");
                    continue;
                }
            };

            match serde_json::from_slice::<ArchivalRecord>(&message.payload) {
                Ok(record) => {
                    let incident_id = record.incident_id;
                    match archive.apply(record).await {
                        Ok(entry) => {
                            debug!(%incident_id, stage = ?entry.stage, "archived");
                        }
                        Err(e) => {
                            warn!(
                                %incident_id,
                                error = %e,
                                "failed to store incident entry, leaving for redelivery"
                            );
                            continue;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed archival record");
                }
            }

            if let Err(e) = message.ack().await {
                warn!(error = %e, "failed to ack archival record");
            }
        }

        info!("archive stream ended");
        Ok(())
    }
}

#[async_trait]
impl StatusSink for NatsBroker {
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), BrokerError> {
        let payload = event.encode()?;
        self.client
            .publish(subjects::STATUS, payload.into())
            .await
            .map_err(|e| {
                BrokerError::Unavailable(format!("failed to publish to {}: {e}", subjects::STATUS))
            })
    }

    async fn archive(&self, record: &ArchivalRecord) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(record)?;
        let ack = self
            .jetstream
            .publish(subjects::ARCHIVE, payload.into())
            .await
            .map_err(|e| {
                BrokerError::Unavailable(format!("failed to publish to {}: {e}", subjects::ARCHIVE))
            })?;
        ack.await
            .map_err(|e| BrokerError::Unavailable(format!("archive publish not acknowledged: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StatusFeed for NatsBroker {
    async fn subscribe(&self) -> Result<FeedStream, BrokerError> {
        let subscriber = self
            .client
            .subscribe(subjects::STATUS)
            .await
            .map_err(|e| {
                BrokerError::Nats(format!("failed to subscribe to {}: {e}", subjects::STATUS))
            })?;
        debug!(subject = subjects::STATUS, "opened status subscription");
        Ok(subscriber.map(|message| message.payload.to_vec()).boxed())
    }
}

impl std::fmt::Debug for NatsBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBroker")
            .field("connected", &true)
            .finish_non_exhaustive()
    }
}
