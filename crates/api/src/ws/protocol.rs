//! Live-channel wire protocol.
//!
//! Every frame is a JSON object with a `type` tag. Clients speak first:
//! `register` binds the connection to a session token, after which the server
//! only pushes. `heartbeat` keeps the binding's `last_seen_at` fresh.

use serde::{Deserialize, Serialize};
use waitline_core::entry::EntrySnapshot;
use waitline_events::{QueueEvent, QueueEventKind, RemovalReason};

/// Client -> server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Bind this connection to a session token. Must be the first frame.
    Register { session_token: String },
    /// Liveness signal; refreshes the session's `last_seen_at`.
    Heartbeat,
}

/// Server -> client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Registration succeeded; carries the authoritative snapshot the client
    /// reconciles against.
    RecoverySuccess { snapshot: EntrySnapshot },
    /// The entry was called to the counter.
    EntryCalled { verification_code: String },
    /// The entry's 1-based position changed.
    PositionChanged { position: u32 },
    /// The entry left the queue.
    EntryRemoved { reason: RemovalReason },
    /// Registration or protocol failure. The connection closes after this.
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Translate a bus event into its wire frame.
    pub fn from_event(event: &QueueEvent) -> Self {
        match &event.kind {
            QueueEventKind::EntryCalled { verification_code } => ServerMessage::EntryCalled {
                verification_code: verification_code.clone(),
            },
            QueueEventKind::PositionChanged { position } => ServerMessage::PositionChanged {
                position: *position,
            },
            QueueEventKind::EntryRemoved { reason } => ServerMessage::EntryRemoved {
                reason: *reason,
            },
        }
    }

    /// Serialize to the JSON text put on the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage is always serialisable")
    }
}
