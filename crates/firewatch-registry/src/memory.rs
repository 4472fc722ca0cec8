//! In-process responder registry.
//!
//! Records live in a `Vec` behind a [`RwLock`] so enumeration follows
//! registration order. Every successful mutation bumps a write counter,
//! which tests use to assert that a failed assignment touched nothing.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use firewatch_types::{Availability, Position, Responder, ResponderId};
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::ResponderRegistry;

/// Registry backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    responders: RwLock<Vec<Responder>>,
    writes: AtomicU64,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `responders`, in order.
    pub fn with_responders(responders: impl IntoIterator<Item = Responder>) -> Self {
        Self {
            responders: RwLock::new(responders.into_iter().collect()),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of mutations applied since construction.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Copy of every record, in enumeration order.
    pub async fn snapshot(&self) -> Vec<Responder> {
        self.responders.read().await.clone()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl ResponderRegistry for InMemoryRegistry {
    async fn find_available(&self) -> Result<Vec<Responder>, RegistryError> {
        let guard = self.responders.read().await;
        Ok(guard
            .iter()
            .filter(|r| r.availability == Availability::Available)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &ResponderId) -> Result<Option<Responder>, RegistryError> {
        let guard = self.responders.read().await;
        Ok(guard.iter().find(|r| &r.id == id).cloned())
    }

    async fn update_status(
        &self,
        id: &ResponderId,
        availability: Availability,
    ) -> Result<(), RegistryError> {
        let mut guard = self.responders.write().await;
        let record = guard
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.availability = availability;
        self.record_write();
        Ok(())
    }

    async fn update_position(
        &self,
        id: &ResponderId,
        position: Position,
        availability: Availability,
    ) -> Result<(), RegistryError> {
        let mut guard = self.responders.write().await;
        let record = guard
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.position = position;
        record.availability = availability;
        self.record_write();
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        id: &ResponderId,
        expected: Availability,
        new: Availability,
    ) -> Result<bool, RegistryError> {
        let mut guard = self.responders.write().await;
        let record = guard
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if record.availability != expected {
            return Ok(false);
        }
        record.availability = new;
        self.record_write();
        Ok(true)
    }

    async fn register(&self, responder: Responder) -> Result<(), RegistryError> {
        let mut guard = self.responders.write().await;
        if let Some(existing) = guard.iter_mut().find(|r| r.id == responder.id) {
            *existing = responder;
        } else {
            guard.push(responder);
        }
        self.record_write();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fleet() -> InMemoryRegistry {
        InMemoryRegistry::with_responders([
            Responder::available("a", Position::new(0.0, 0.0)),
            Responder {
                id: ResponderId::new("b"),
                position: Position::new(5.0, 5.0),
                availability: Availability::Busy,
            },
            Responder::available("c", Position::new(10.0, 10.0)),
        ])
    }

    #[tokio::test]
    async fn find_available_keeps_registration_order() {
        let registry = fleet();
        let ids: Vec<String> = registry
            .find_available()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(registry.writes(), 0);
    }

    #[tokio::test]
    async fn compare_and_set_only_swaps_on_match() {
        let registry = fleet();
        let a = ResponderId::new("a");
        assert!(
            registry
                .compare_and_set_status(&a, Availability::Available, Availability::Busy)
                .await
                .unwrap()
        );
        assert!(
            !registry
                .compare_and_set_status(&a, Availability::Available, Availability::Busy)
                .await
                .unwrap()
        );
        assert_eq!(registry.writes(), 1);
    }

    #[tokio::test]
    async fn update_position_moves_and_frees_responder() {
        let registry = fleet();
        let b = ResponderId::new("b");
        registry
            .update_position(&b, Position::new(1.0, 2.0), Availability::Available)
            .await
            .unwrap();
        let record = registry.find_by_id(&b).await.unwrap().unwrap();
        assert_eq!(record.availability, Availability::Available);
        assert_eq!(record.position, Position::new(1.0, 2.0));
    }

    #[tokio::test]
    async fn unknown_responder_is_not_found() {
        let registry = fleet();
        let ghost = ResponderId::new("ghost");
        assert!(registry.find_by_id(&ghost).await.unwrap().is_none());
        let result = registry.update_status(&ghost, Availability::Busy).await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn register_replaces_in_place() {
        let registry = fleet();
        registry
            .register(Responder::available("a", Position::new(9.0, 9.0)))
            .await
            .unwrap();
        registry
            .register(Responder::available("d", Position::new(1.0, 1.0)))
            .await
            .unwrap();
        let ids: Vec<String> = registry.snapshot().await.into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }
}
