//! `WebSocket` handler for the live status stream.
//!
//! Observers connect to `GET /ws/updates?observer_id=<id>` and receive a
//! JSON-encoded [`StatusEvent`] text frame for every event published
//! while they are connected. Each connection owns its own subscription;
//! it is released when the handler returns.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use firewatch_types::{ObserverId, StatusEvent};
use futures::StreamExt as _;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Query parameters accepted by the upgrade route.
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Caller-chosen observer id, used only for logging. A random id is
    /// assigned when absent.
    pub observer_id: Option<String>,
}

/// Upgrade an HTTP request to a `WebSocket` and begin relaying events.
///
/// # Route
///
/// `GET /ws/updates`
pub async fn ws_updates(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let observer = params.observer_id.map_or_else(
        || ObserverId::new(format!("observer-{}", uuid::Uuid::new_v4())),
        ObserverId::new,
    );
    ws.on_upgrade(move |socket| relay(socket, state, observer))
}

/// Relay loop for one observer.
async fn relay(mut socket: WebSocket, state: Arc<AppState>, observer: ObserverId) {
    let mut feed = match state.subscribe().await {
        Ok(feed) => feed,
        Err(e) => {
            warn!(observer_id = %observer, error = %e, "Failed to subscribe to status feed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let _guard = state.connect();
    info!(observer_id = %observer, observers = state.observers(), "Observer connected");

    loop {
        tokio::select! {
            payload = feed.next() => {
                let Some(payload) = payload else {
                    debug!(observer_id = %observer, "Status feed closed");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let Some(frame) = encode_frame(&payload) else {
                    state.record_dropped();
                    continue;
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    debug!(observer_id = %observer, "Observer disconnected (send failed)");
                    break;
                }
                state.record_relayed();
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(observer_id = %observer, "Observer closed the connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(observer_id = %observer, "Observer disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(observer_id = %observer, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(observer_id = %observer, "Observer disconnected");
}

/// Decode a broker payload and re-encode it as a text frame.
///
/// `None` for payloads that are not a valid [`StatusEvent`].
fn encode_frame(payload: &[u8]) -> Option<String> {
    let event = StatusEvent::decode(payload)
        .map_err(|e| debug!(error = %e, "Dropping malformed status payload"))
        .ok()?;
    serde_json::to_string(&event).ok()
}
