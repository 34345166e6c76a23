//! WebSocket notification endpoint
//!
//! Each connection gets its own event bus subscription, taken before the
//! upgrade completes. Nothing published earlier is replayed. A client that
//! falls behind is sent a `lagged` notice with the number of events it
//! missed and then continues with the newest ones.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use propmap_common::events::PropmapEvent;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// Sent in place of events a slow client lost
#[derive(Debug, Serialize)]
struct LaggedNotice {
    #[serde(rename = "type")]
    kind: &'static str,
    skipped: u64,
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.bus.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

async fn handle_socket(mut socket: WebSocket, mut events: broadcast::Receiver<PropmapEvent>) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "WebSocket client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let text = match event {
                    Ok(event) => serde_json::to_string(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection_id = %connection_id, skipped, "WebSocket client lagging");
                        serde_json::to_string(&LaggedNotice { kind: "lagged", skipped })
                    }
                    Err(RecvError::Closed) => break,
                };

                let text = match text {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection_id = %connection_id, "Failed to serialize event: {}", e);
                        continue;
                    }
                };

                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Client messages carry nothing; pings are answered by axum
                    Some(Ok(_)) => debug!(connection_id = %connection_id, "Ignoring client message"),
                }
            }
        }
    }

    info!(connection_id = %connection_id, "WebSocket client disconnected");
}
