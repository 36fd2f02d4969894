//! Session-keyed registry of live WebSocket connections.
//!
//! One customer session may hold several connections at once (multi-tab), so
//! the registry keys connections by a per-tab connection id and indexes them
//! by session token for targeted fan-out. It is an injected instance rather
//! than a process global, so tests drive it directly with fake connections.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use waitline_core::types::Timestamp;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection (one browser tab).
pub struct Connection {
    /// Session token the connection registered with.
    pub session_token: String,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. The lock is read-mostly: delivery and
/// heartbeats take read guards, only register/unregister write.
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Connection>>,
}

impl ConnectionManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection under a session token.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn register(
        &self,
        conn_id: String,
        session_token: String,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            session_token,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn unregister(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Send a message to every connection bound to a session token.
    ///
    /// This is the fan-out primitive: a customer with k open tabs has k
    /// connections under one token, and no other customer shares the token.
    /// Connections whose send channels are closed are silently skipped (they
    /// will be cleaned up when their receive loop exits). Returns the number
    /// of connections the message was sent to.
    pub async fn send_to_session(&self, session_token: &str, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if conn.session_token == session_token {
                let _ = conn.sender.send(message.clone());
                count += 1;
            }
        }
        count
    }

    /// Find all connection IDs bound to a given session token.
    pub async fn connections_for_session(&self, session_token: &str) -> Vec<String> {
        self.connections
            .read()
            .await
            .iter()
            .filter_map(|(id, conn)| {
                if conn.session_token == session_token {
                    Some(id.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
