//! Operator client for the Firewatch dispatch system.
//!
//! The client reads a list of emergencies, submits them one at a time
//! through `AssignEmergency`, and follows each one on the relay's status
//! stream until it is extinguished. A [`Reconciler`] per emergency
//! matches stream events to the submission and tracks its local phase;
//! [`session::run_session`] drives the submit-and-wait loop.
//!
//! # Modules
//!
//! - [`config`] -- Environment configuration
//! - [`input`] -- Emergency file loading
//! - [`reconciler`] -- Per-emergency state machine
//! - [`stream`] -- Relay `WebSocket` reader
//! - [`assign`] -- `AssignEmergency` client over NATS
//! - [`session`] -- Submit-and-wait loop
//! - [`error`] -- Client error type

pub mod assign;
pub mod config;
pub mod error;
pub mod input;
pub mod reconciler;
pub mod session;
pub mod stream;

pub use assign::{NatsAssignClient, Submitter};
pub use config::ClientConfig;
pub use error::ClientError;
pub use reconciler::{Observation, Phase, Progress, Reconciler};
pub use session::{Outcome, OutcomeKind, run_session};
