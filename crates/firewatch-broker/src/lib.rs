//! Broker plumbing for the Firewatch dispatch system.
//!
//! Two broker primitives carry everything the dispatch core emits:
//!
//! - a **fanout topic** for live lifecycle events, where every subscriber
//!   present at publish time receives its own copy, and
//! - a **durable queue** for archival snapshots, consumed at least once.
//!
//! Publishing is best-effort. The [`EventEmitter`] owns a single
//! background task that drains an ordered queue into a [`StatusSink`],
//! so the lifecycle state machine never waits on the broker and a
//! failed publish never fails a response.
//!
//! # Modules
//!
//! - [`sink`] -- The [`StatusSink`] / [`StatusFeed`] seams
//! - [`emitter`] -- Ordered fire-and-forget emission with an error channel
//! - [`nats`] -- NATS implementation (core subjects + JetStream)
//! - [`local`] -- In-process implementation for tests and single-node runs,
//!   with bounded history
//! - [`archive`] -- Folding archival records into incident entries
//! - [`error`] -- Shared error type

pub mod archive;
pub mod emitter;
pub mod error;
pub mod local;
pub mod nats;
pub mod sink;

pub use archive::{IncidentArchive, IncidentEntry, IncidentStore, MemoryIncidentStore};
pub use emitter::{DeliveryFailure, DeliveryTarget, EventEmitter};
pub use error::BrokerError;
pub use local::LocalBroker;
pub use nats::NatsBroker;
pub use sink::{FeedStream, StatusFeed, StatusSink};
