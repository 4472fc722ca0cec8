//! Shared state for the relay server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use firewatch_broker::{BrokerError, FeedStream, StatusFeed};

/// Feed handle plus relay counters, shared by every connection.
pub struct AppState {
    feed: Arc<dyn StatusFeed>,
    observers: AtomicUsize,
    relayed: AtomicU64,
    dropped: AtomicU64,
}

impl AppState {
    /// Create state over a status feed.
    pub fn new(feed: Arc<dyn StatusFeed>) -> Self {
        Self {
            feed,
            observers: AtomicUsize::new(0),
            relayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open a fresh subscription for one observer.
    pub async fn subscribe(&self) -> Result<FeedStream, BrokerError> {
        self.feed.subscribe().await
    }

    /// Observers currently connected.
    pub fn observers(&self) -> usize {
        self.observers.load(Ordering::Relaxed)
    }

    /// Events forwarded to observers, counted once per observer.
    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }

    /// Malformed payloads discarded.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an observer as connected until the returned guard drops.
    pub(crate) fn connect(self: &Arc<Self>) -> ObserverGuard {
        self.observers.fetch_add(1, Ordering::Relaxed);
        ObserverGuard(Arc::clone(self))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("observers", &self.observers())
            .field("relayed", &self.relayed())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

/// Decrements the observer count on drop.
pub(crate) struct ObserverGuard(Arc<AppState>);

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.0.observers.fetch_sub(1, Ordering::Relaxed);
    }
}
