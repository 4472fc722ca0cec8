//! Responder registry for the Firewatch dispatch system.
//!
//! The registry holds each responder's identity, last known position,
//! and availability flag. It is read and written only by the assignment
//! coordinator and the response executor. Writes are unconditional
//! (last write wins); the coordinator's single-flight section is what
//! keeps two assignments from holding the same responder, with
//! [`ResponderRegistry::compare_and_set_status`] available for the
//! selection-only lock scope.
//!
//! # Modules
//!
//! - [`memory`] -- In-process registry used by tests and single-node runs
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) registry
//! - [`error`] -- Shared error type

pub mod dragonfly;
pub mod error;
pub mod memory;

use async_trait::async_trait;
use firewatch_types::{Availability, Position, Responder, ResponderId};

pub use dragonfly::DragonflyRegistry;
pub use error::RegistryError;
pub use memory::InMemoryRegistry;

/// Access to the responder records.
///
/// Enumeration order of [`find_available`](Self::find_available) is the
/// registration order and is stable between calls; the coordinator's
/// first-seen tie-break depends on it.
#[async_trait]
pub trait ResponderRegistry: Send + Sync {
    /// All responders currently marked [`Availability::Available`].
    async fn find_available(&self) -> Result<Vec<Responder>, RegistryError>;

    /// Look up a responder by id. `Ok(None)` if it is not registered.
    async fn find_by_id(&self, id: &ResponderId) -> Result<Option<Responder>, RegistryError>;

    /// Overwrite a responder's availability.
    async fn update_status(
        &self,
        id: &ResponderId,
        availability: Availability,
    ) -> Result<(), RegistryError>;

    /// Overwrite a responder's position and availability in one write.
    async fn update_position(
        &self,
        id: &ResponderId,
        position: Position,
        availability: Availability,
    ) -> Result<(), RegistryError>;

    /// Atomically set the availability to `new` if it currently equals
    /// `expected`. Returns whether the swap happened.
    async fn compare_and_set_status(
        &self,
        id: &ResponderId,
        expected: Availability,
        new: Availability,
    ) -> Result<bool, RegistryError>;

    /// Insert or replace a responder record. New ids are appended to the
    /// enumeration order; existing ids keep their place.
    async fn register(&self, responder: Responder) -> Result<(), RegistryError>;
}
