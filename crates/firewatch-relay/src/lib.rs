//! Status relay for the Firewatch dispatch system.
//!
//! Each observer that connects to `GET /ws/updates` gets its own
//! subscription on the live status topic and receives every lifecycle
//! event published while it stays connected, one JSON text frame per
//! event. There is no backlog: events published before the connection
//! are not replayed.
//!
//! Malformed broker payloads are dropped without telling the observer.
//! When a send to the observer fails, the relay loop for that observer
//! ends and its subscription is released; other observers are not
//! affected.

pub mod config;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use config::RelayConfig;
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
