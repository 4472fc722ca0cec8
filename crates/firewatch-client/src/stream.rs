//! Background reader for the relay's status stream.
//!
//! [`connect`] opens the `WebSocket` and spawns a task that decodes each
//! text frame into a [`StatusEvent`] and forwards it on a channel. The
//! channel closes when the relay goes away or the receiver is dropped.

use firewatch_types::{ObserverId, StatusEvent};
use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Events buffered between the reader task and the session loop.
const EVENT_BUFFER: usize = 1024;

/// Build the subscription URL for `observer`.
pub fn subscribe_url(relay_url: &str, observer: &ObserverId) -> String {
    let separator = if relay_url.contains('?') { '&' } else { '?' };
    format!("{relay_url}{separator}observer_id={observer}")
}

/// Connect to the relay and start the reader task.
///
/// # Errors
///
/// Returns [`ClientError::Stream`] if the `WebSocket` handshake fails.
pub async fn connect(
    relay_url: &str,
    observer: &ObserverId,
) -> Result<(mpsc::Receiver<StatusEvent>, JoinHandle<()>), ClientError> {
    let url = subscribe_url(relay_url, observer);
    let (mut socket, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| ClientError::Stream(format!("failed to connect to {url}: {e}")))?;
    info!(url = %url, "Connected to status relay");

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let reader = tokio::spawn(async move {
        while let Some(frame) = socket.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    debug!("Relay closed the stream");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Relay stream error");
                    break;
                }
            };
            match StatusEvent::decode(text.as_bytes()) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring undecodable frame"),
            }
        }
        info!("Status relay reader stopped");
    });
    Ok((rx, reader))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_observer_id() {
        let observer = ObserverId::new("ops-1");
        assert_eq!(
            subscribe_url("ws://relay:8090/ws/updates", &observer),
            "ws://relay:8090/ws/updates?observer_id=ops-1"
        );
        assert_eq!(
            subscribe_url("ws://relay/ws/updates?v=1", &observer),
            "ws://relay/ws/updates?v=1&observer_id=ops-1"
        );
    }
}
