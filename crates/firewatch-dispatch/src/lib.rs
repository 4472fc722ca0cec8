//! Dispatch core for the Firewatch system.
//!
//! The [`AssignmentCoordinator`] picks the nearest available responder
//! for each emergency inside a single-flight section and hands the job
//! to the [`ResponseExecutor`], which simulates travel and mitigation
//! while emitting the ordered lifecycle events:
//!
//! ```text
//! AssignEmergency --> AssignmentCoordinator --ExecuteResponse--> ResponseExecutor
//!                          |                                        |
//!                          +-- registry (mark busy / restore)       +-- registry (final position)
//!                          +-- archive (in progress)                +-- status topic (lifecycle)
//!                                                                   +-- archive (extinguished)
//! ```
//!
//! Both sides are reachable over NATS request/reply through [`rpc`] and
//! can also be wired in-process with [`rpc::LocalExecutorClient`].
//!
//! # Modules
//!
//! - [`coordinator`] -- Selection rule, single-flight section, restore policy
//! - [`executor`] -- Responder-side lifecycle simulation
//! - [`rpc`] -- Executor client seam, NATS clients and service loops
//! - [`config`] -- YAML configuration
//! - [`archive_store`] -- Dragonfly persistence for archived incidents
//! - [`error`] -- Dispatch error taxonomy

pub mod archive_store;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod rpc;

pub use config::{DispatchConfig, LockScope, Role};
pub use coordinator::{
    AssignmentCoordinator, CoordinatorSettings, RestorePolicy, SingleFlightGauge, nearest_responder,
};
pub use error::DispatchError;
pub use executor::{ExecutorSettings, ResponseExecutor};
pub use rpc::{ExecutorClient, LocalExecutorClient, NatsExecutorClient};
