//! Live-channel HTTP upgrade handler.
//!
//! After the upgrade the client must send a `register` frame binding the
//! connection to a session token. Registration against anything but a live
//! entry fails with one uniform error frame -- the channel does not reveal
//! whether a token is forged, expired, or stale.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use waitline_core::recovery::SessionStatus;

use crate::state::AppState;
use crate::ws::protocol::{ClientMessage, ServerMessage};

/// How long the client has to send its `register` frame after the upgrade.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// 1. Awaits the `register` frame and resolves its session token.
/// 2. Registers the connection with `ConnectionManager` and confirms with
///    `recovery-success` carrying the authoritative snapshot.
/// 3. Spawns a sender task that forwards dispatched events to the sink.
/// 4. Processes inbound frames (heartbeats) on the current task.
/// 5. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();

    // Step 1: the client speaks first.
    let session_token = match await_register(&mut stream).await {
        Some(token) => token,
        None => {
            let _ = sink
                .send(Message::Text(protocol_error("REGISTER_REQUIRED").to_json().into()))
                .await;
            return;
        }
    };

    // Only a token bound to a live entry may open a channel; everything else
    // gets the same error frame a forged token would.
    let snapshot = match state.registry.status(&session_token, chrono::Utc::now()).await {
        Ok(SessionStatus::Active(snapshot)) => snapshot,
        Ok(SessionStatus::Restorable { .. }) | Err(_) => {
            tracing::debug!(conn_id = %conn_id, "WebSocket registration refused");
            let _ = sink
                .send(Message::Text(protocol_error("SESSION_NOT_FOUND").to_json().into()))
                .await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(conn_id = %conn_id, entry_id = snapshot.entry_id, "WebSocket registered");

    // Step 2: register, then confirm with the snapshot before any event can
    // race ahead of it.
    let mut rx = state
        .connections
        .register(conn_id.clone(), session_token.clone())
        .await;
    if sink
        .send(Message::Text(
            ServerMessage::RecoverySuccess { snapshot }.to_json().into(),
        ))
        .await
        .is_err()
    {
        state.connections.unregister(&conn_id).await;
        return;
    }

    // Step 3: sender task forwards dispatched messages to the sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Step 4: inbound loop.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Heartbeat) => {
                    state
                        .registry
                        .touch(&session_token, chrono::Utc::now())
                        .await;
                }
                Ok(ClientMessage::Register { .. }) => {
                    tracing::debug!(conn_id = %conn_id, "Duplicate register frame ignored");
                }
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "Malformed client frame");
                }
            },
            Ok(_) => {
                // Binary / raw frames -- ignore.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Step 5: clean up.
    state.connections.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Wait for the initial `register` frame, bounded by [`REGISTER_TIMEOUT`].
async fn await_register(
    stream: &mut futures::stream::SplitStream<WebSocket>,
) -> Option<String> {
    let first = tokio::time::timeout(REGISTER_TIMEOUT, stream.next())
        .await
        .ok()??;
    let text = match first {
        Ok(Message::Text(text)) => text,
        _ => return None,
    };
    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Register { session_token }) => Some(session_token),
        _ => None,
    }
}

/// Uniform error frame; the message never says more than the code.
fn protocol_error(code: &str) -> ServerMessage {
    ServerMessage::Error {
        code: code.to_string(),
        message: "Not in any queue".to_string(),
    }
}
