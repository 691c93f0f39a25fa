//! WebSocket upgrade handler and per-connection pumps.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use pixelforge_core::types::DbId;

use crate::auth::AuthUser;
use crate::state::AppState;
use crate::ws::registry::SessionRegistry;

/// GET /api/v1/ws
///
/// Upgrades the connection to WebSocket and binds it to the
/// authenticated user. The new session supersedes any session the user
/// already has — one live session per user, always the most recent.
pub async fn ws_handler(
    auth: AuthUser,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, auth.user_id, state.registry))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the session, superseding any prior one for this user.
///   2. Spawns a sender task that forwards registry messages to the sink.
///   3. Processes inbound frames (heartbeats) on the current task.
///   4. Unregisters on disconnect; a stale unregister after a supersede
///      is a no-op inside the registry.
async fn handle_socket(socket: WebSocket, user_id: DbId, registry: Arc<SessionRegistry>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(user_id, session_id = %session_id, "Notification session connected");

    let mut rx = registry.register(user_id, session_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward registry messages to the WebSocket sink.
    let sender_session = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(session_id = %sender_session, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: heartbeats and close frames.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                registry.heartbeat(user_id).await;
            }
            Ok(Message::Text(text)) => {
                if is_heartbeat(&text) {
                    registry.heartbeat(user_id).await;
                } else {
                    tracing::debug!(user_id, "Ignoring unexpected client frame");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    registry.unregister(user_id, &session_id).await;
    send_task.abort();
    tracing::info!(user_id, session_id = %session_id, "Notification session disconnected");
}

/// Whether an inbound text frame is a client heartbeat message
/// (`{"type": "heartbeat"}`).
fn is_heartbeat(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "heartbeat"))
        .unwrap_or(false)
}
