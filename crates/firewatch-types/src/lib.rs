//! Shared type definitions for the Firewatch dispatch system.
//!
//! This crate is the single source of truth for the types that cross
//! process boundaries: the records kept in the responder registry, the
//! lifecycle events fanned out on the live status topic, the archival
//! records pushed to the durable queue, and the request/reply envelopes
//! used by the `AssignEmergency` and `ExecuteResponse` calls.
//!
//! # Modules
//!
//! - [`ids`] -- Typed identifiers (incidents, responders, observers)
//! - [`enums`] -- Availability, lifecycle state, archival stage
//! - [`structs`] -- Positions, responders, emergencies, status events
//! - [`wire`] -- Subject names and RPC request/reply envelopes

pub mod enums;
pub mod ids;
pub mod structs;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use enums::{ArchivalStage, Availability, LifecycleState};
pub use ids::{IncidentId, ObserverId, ResponderId};
pub use structs::{ArchivalRecord, Emergency, InvalidEmergency, Position, Responder, StatusEvent};
pub use wire::{
    AssignReply, AssignRequest, ExecuteReply, ExecuteRequest, FailureKind, RpcFailure, RpcReply,
    subjects,
};
