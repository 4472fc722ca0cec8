//! Archival ledger: one entry per incident, opened by the coordinator's
//! in-progress snapshot and closed by the executor's terminal snapshot.
//!
//! The durable queue is at-least-once, so [`IncidentArchive::apply`] is
//! idempotent and never moves a closed entry back to in-progress. Every
//! record is merged into the entry already held by the [`IncidentStore`],
//! so an archiver keeps no per-incident state between messages and a
//! restarted process picks up where the previous one stopped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firewatch_types::{ArchivalRecord, ArchivalStage, IncidentId, ResponderId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::BrokerError;

/// Archived view of one incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEntry {
    /// Incident identifier.
    pub incident_id: IncidentId,
    /// Responder that handled it.
    pub responder_id: ResponderId,
    /// Human-readable label.
    pub location_label: String,
    /// Latest stage reached.
    pub stage: ArchivalStage,
    /// When the responder was committed, if that snapshot has arrived.
    pub started_at: Option<DateTime<Utc>>,
    /// When the incident was extinguished, if it has been.
    pub finished_at: Option<DateTime<Utc>>,
}

impl IncidentEntry {
    /// Start an entry from the first record seen for an incident.
    pub fn open(record: &ArchivalRecord) -> Self {
        Self {
            incident_id: record.incident_id,
            responder_id: record.responder_id.clone(),
            location_label: record.location_label.clone(),
            stage: record.stage,
            started_at: None,
            finished_at: None,
        }
    }

    /// Fold `record` into this entry.
    pub fn merge(&mut self, record: ArchivalRecord) {
        match record.stage {
            ArchivalStage::InProgress => {
                // Keep the earliest start across redeliveries.
                if self.started_at.is_none_or(|t| record.timestamp < t) {
                    self.started_at = Some(record.timestamp);
                }
            }
            ArchivalStage::Extinguished => {
                self.stage = ArchivalStage::Extinguished;
                self.responder_id = record.responder_id;
                if self.finished_at.is_none() {
                    self.finished_at = Some(record.timestamp);
                }
            }
        }
    }
}

/// Where archived incident entries are persisted.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Read the stored entry for an incident, if any.
    async fn load(&self, incident_id: &IncidentId) -> Result<Option<IncidentEntry>, BrokerError>;

    /// Insert or overwrite the entry for its incident.
    async fn save(&self, entry: &IncidentEntry) -> Result<(), BrokerError>;
}

/// Load-merge-save fold over archival records.
///
/// Records for one incident must be applied by a single task at a time.
/// Two replicas applying the same incident concurrently race, and the
/// last save wins.
#[derive(Clone)]
pub struct IncidentArchive {
    store: Arc<dyn IncidentStore>,
}

impl fmt::Debug for IncidentArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidentArchive").finish_non_exhaustive()
    }
}

impl IncidentArchive {
    /// Fold records into `store`.
    pub const fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    /// Merge `record` into its stored entry and persist the result.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the entry cannot be read or written.
    /// Nothing is saved when the read fails.
    pub async fn apply(&self, record: ArchivalRecord) -> Result<IncidentEntry, BrokerError> {
        let mut entry = self
            .store
            .load(&record.incident_id)
            .await?
            .unwrap_or_else(|| IncidentEntry::open(&record));
        entry.merge(record);
        self.store.save(&entry).await?;
        Ok(entry)
    }
}

/// Incident store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryIncidentStore {
    entries: Mutex<BTreeMap<IncidentId, IncidentEntry>>,
}

impl MemoryIncidentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored entry.
    pub async fn get(&self, incident_id: &IncidentId) -> Option<IncidentEntry> {
        self.entries.lock().await.get(incident_id).cloned()
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn load(&self, incident_id: &IncidentId) -> Result<Option<IncidentEntry>, BrokerError> {
        Ok(self.get(incident_id).await)
    }

    async fn save(&self, entry: &IncidentEntry) -> Result<(), BrokerError> {
        self.entries
            .lock()
            .await
            .insert(entry.incident_id, entry.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration;

    use super::*;

    fn record(id: IncidentId, stage: ArchivalStage, at: DateTime<Utc>) -> ArchivalRecord {
        ArchivalRecord {
            incident_id: id,
            responder_id: ResponderId::new("d1"),
            stage,
            location_label: String::from("Quebrada"),
            timestamp: at,
        }
    }

    fn archive_over(store: &Arc<MemoryIncidentStore>) -> IncidentArchive {
        IncidentArchive::new(Arc::clone(store) as Arc<dyn IncidentStore>)
    }

    #[tokio::test]
    async fn in_progress_then_extinguished_closes_entry() {
        let store = Arc::new(MemoryIncidentStore::new());
        let archive = archive_over(&store);
        let id = IncidentId::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(30);

        let opened = archive
            .apply(record(id, ArchivalStage::InProgress, t0))
            .await
            .unwrap();
        assert_eq!(opened.stage, ArchivalStage::InProgress);
        assert_eq!(opened.started_at, Some(t0));
        assert_eq!(opened.finished_at, None);

        let closed = archive
            .apply(record(id, ArchivalStage::Extinguished, t1))
            .await
            .unwrap();
        assert_eq!(closed.stage, ArchivalStage::Extinguished);
        assert_eq!(closed.started_at, Some(t0));
        assert_eq!(closed.finished_at, Some(t1));
        assert_eq!(store.get(&id).await, Some(closed));
    }

    #[tokio::test]
    async fn restarted_archiver_keeps_start_time() {
        let store = Arc::new(MemoryIncidentStore::new());
        let id = IncidentId::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(45);

        archive_over(&store)
            .apply(record(id, ArchivalStage::InProgress, t0))
            .await
            .unwrap();

        // A fresh archiver, as after a restart or on another replica.
        let closed = archive_over(&store)
            .apply(record(id, ArchivalStage::Extinguished, t1))
            .await
            .unwrap();
        assert_eq!(closed.started_at, Some(t0));
        assert_eq!(closed.finished_at, Some(t1));

        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.started_at, Some(t0));
        assert_eq!(stored.stage, ArchivalStage::Extinguished);
    }

    #[tokio::test]
    async fn redelivered_in_progress_does_not_reopen() {
        let store = Arc::new(MemoryIncidentStore::new());
        let archive = archive_over(&store);
        let id = IncidentId::new();
        let t0 = Utc::now();
        archive
            .apply(record(id, ArchivalStage::InProgress, t0))
            .await
            .unwrap();
        archive
            .apply(record(id, ArchivalStage::Extinguished, t0 + Duration::seconds(5)))
            .await
            .unwrap();
        let after = archive
            .apply(record(id, ArchivalStage::InProgress, t0))
            .await
            .unwrap();
        assert_eq!(after.stage, ArchivalStage::Extinguished);
        assert_eq!(
            store.get(&id).await.map(|e| e.stage),
            Some(ArchivalStage::Extinguished)
        );
    }

    #[tokio::test]
    async fn terminal_snapshot_alone_creates_closed_entry() {
        let store = Arc::new(MemoryIncidentStore::new());
        let id = IncidentId::new();
        let entry = archive_over(&store)
            .apply(record(id, ArchivalStage::Extinguished, Utc::now()))
            .await
            .unwrap();
        assert_eq!(entry.stage, ArchivalStage::Extinguished);
        assert!(entry.started_at.is_none());
        assert!(entry.finished_at.is_some());
    }

    /// Memory store whose reads can be switched off.
    #[derive(Default)]
    struct UnreadableStore {
        inner: MemoryIncidentStore,
        reads_fail: AtomicBool,
    }

    #[async_trait]
    impl IncidentStore for UnreadableStore {
        async fn load(&self, id: &IncidentId) -> Result<Option<IncidentEntry>, BrokerError> {
            if self.reads_fail.load(Ordering::SeqCst) {
                return Err(BrokerError::Store(String::from("read refused")));
            }
            self.inner.load(id).await
        }

        async fn save(&self, entry: &IncidentEntry) -> Result<(), BrokerError> {
            self.inner.save(entry).await
        }
    }

    #[tokio::test]
    async fn failed_read_leaves_stored_entry_untouched() {
        let store = Arc::new(UnreadableStore::default());
        let archive = IncidentArchive::new(Arc::clone(&store) as Arc<dyn IncidentStore>);
        let id = IncidentId::new();
        let t0 = Utc::now();
        archive
            .apply(record(id, ArchivalStage::InProgress, t0))
            .await
            .unwrap();

        store.reads_fail.store(true, Ordering::SeqCst);
        let result = archive
            .apply(record(id, ArchivalStage::Extinguished, t0 + Duration::seconds(5)))
            .await;
        assert!(matches!(result, Err(BrokerError::Store(_))));

        let stored = store.inner.get(&id).await.unwrap();
        assert_eq!(stored.stage, ArchivalStage::InProgress);
        assert_eq!(stored.started_at, Some(t0));
    }
}
