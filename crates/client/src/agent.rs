//! The session agent.
//!
//! One agent instance corresponds to one customer session in a browser
//! origin. On startup it recovers from persisted state; afterwards it keeps
//! the live channel open, reconciles every pushed event into its snapshot,
//! persists the result, and mirrors it to sibling tabs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::mirror::{TabEvent, TabMirror};
use crate::store::{StateStore, KEY_SESSION_TOKEN, KEY_SNAPSHOT};

/// Reconnection delay after a live-channel failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Interval between client heartbeats on the live channel.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The client's view of its queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub queue_id: i64,
    pub entry_id: i64,
    /// `"waiting"`, `"called"`, `"seated"`, or `"cancelled"`.
    pub state: String,
    pub position: u32,
    pub verification_code: String,
    #[serde(default)]
    pub estimated_wait_secs: u64,
}

/// Envelope for incoming frames on the live channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    RecoverySuccess { snapshot: ClientSnapshot },
    EntryCalled { verification_code: String },
    PositionChanged { position: u32 },
    EntryRemoved { reason: String },
    Error { code: String, message: String },
}

/// Outgoing frames on the live channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientFrame {
    Register { session_token: String },
    Heartbeat,
}

/// Body of the join endpoint's `data` envelope.
#[derive(Debug, Deserialize)]
struct JoinData {
    entry_id: i64,
    verification_code: String,
    position: u32,
    #[serde(default)]
    estimated_wait_secs: u64,
    session_token: String,
}

/// Body of the status endpoint's `data` envelope.
#[derive(Debug, Deserialize)]
struct StatusData {
    queue_id: i64,
    state: String,
    position: Option<u32>,
    verification_code: Option<String>,
    #[serde(default)]
    estimated_wait_secs: Option<u64>,
    restorable: bool,
    restore_deadline: Option<chrono::DateTime<chrono::Utc>>,
}

// ---------------------------------------------------------------------------
// Public API surface
// ---------------------------------------------------------------------------

/// Result of attempting recovery from persisted state.
#[derive(Debug, Clone)]
pub enum Recovery {
    /// The token resolved to a live entry; the snapshot is current.
    Recovered(ClientSnapshot),
    /// The entry is cancelled but inside its grace window;
    /// [`SessionAgent::restore`] will re-admit it.
    Restorable {
        deadline: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// No usable session; the UI should show the rejoin affordance.
    RejoinRequired,
}

/// Explicit confirmation for destructive actions.
///
/// Cancellation takes this instead of a bare bool so a single accidental
/// click can never drop a place in line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Dismissed,
}

/// Client-side errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("No stored session")]
    NoSession,

    #[error("Cancellation requires explicit confirmation")]
    ConfirmationRequired,

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

// ---------------------------------------------------------------------------
// SessionAgent
// ---------------------------------------------------------------------------

/// Browser-side session agent.
pub struct SessionAgent {
    base_url: String,
    ws_url: String,
    http: reqwest::Client,
    store: Arc<dyn StateStore>,
    mirror: TabMirror,
    snapshot: Mutex<Option<ClientSnapshot>>,
}

impl SessionAgent {
    /// Create an agent against `base_url` (e.g. `http://localhost:3000`).
    ///
    /// The last persisted snapshot, if any, is loaded immediately so the UI
    /// can render before the first network round-trip.
    pub fn new(base_url: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let ws_url = format!(
            "{}/api/v1/ws",
            base_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        );

        let snapshot = store
            .get(KEY_SNAPSHOT)
            .and_then(|raw| serde_json::from_str(&raw).ok());

        Self {
            base_url,
            ws_url,
            http: reqwest::Client::new(),
            store,
            mirror: TabMirror::default(),
            snapshot: Mutex::new(snapshot),
        }
    }

    /// The local broadcast sibling tabs subscribe to.
    pub fn mirror(&self) -> &TabMirror {
        &self.mirror
    }

    /// The persisted session token, if any.
    pub fn session_token(&self) -> Option<String> {
        self.store.get(KEY_SESSION_TOKEN)
    }

    /// The current in-memory snapshot, if any.
    pub fn snapshot(&self) -> Option<ClientSnapshot> {
        self.snapshot.lock().expect("snapshot lock poisoned").clone()
    }

    // -----------------------------------------------------------------------
    // REST operations
    // -----------------------------------------------------------------------

    /// Join a queue, persisting the issued token and snapshot.
    pub async fn join(
        &self,
        queue_id: i64,
        display_name: &str,
        contact: &str,
        party_size: u32,
    ) -> Result<ClientSnapshot, AgentError> {
        let url = format!("{}/api/v1/queues/{queue_id}/join", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "display_name": display_name,
                "contact": contact,
                "party_size": party_size,
            }))
            .send()
            .await?;
        let data: JoinData = expect_data(response).await?;

        self.store.set(KEY_SESSION_TOKEN, &data.session_token);
        let snapshot = ClientSnapshot {
            queue_id,
            entry_id: data.entry_id,
            state: "waiting".to_string(),
            position: data.position,
            verification_code: data.verification_code,
            estimated_wait_secs: data.estimated_wait_secs,
        };
        self.set_snapshot(snapshot.clone());
        tracing::info!(
            queue_id,
            position = snapshot.position,
            code = %snapshot.verification_code,
            "Joined queue"
        );
        Ok(snapshot)
    }

    /// Attempt recovery from persisted state.
    ///
    /// A uniform lookup failure clears the stored session -- the token is
    /// either forged (impossible locally) or expired, and keeping it would
    /// only repeat the failure on every load.
    pub async fn recover(&self) -> Result<Recovery, AgentError> {
        let Some(token) = self.session_token() else {
            return Ok(Recovery::RejoinRequired);
        };

        let url = format!("{}/api/v1/session/{token}", self.base_url);
        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!("Stored session no longer resolves, rejoin required");
            self.clear_session();
            return Ok(Recovery::RejoinRequired);
        }
        let data: StatusData = expect_data(response).await?;

        if data.restorable {
            return Ok(Recovery::Restorable {
                deadline: data.restore_deadline,
            });
        }

        let snapshot = ClientSnapshot {
            queue_id: data.queue_id,
            entry_id: self.snapshot().map(|s| s.entry_id).unwrap_or_default(),
            state: data.state,
            position: data.position.unwrap_or_default(),
            verification_code: data.verification_code.unwrap_or_default(),
            estimated_wait_secs: data.estimated_wait_secs.unwrap_or(0),
        };
        self.set_snapshot(snapshot.clone());
        tracing::info!(position = snapshot.position, "Session recovered");
        Ok(Recovery::Recovered(snapshot))
    }

    /// Cancel the session's entry. Requires [`Confirmation::Confirmed`].
    ///
    /// The token is kept: it carries the grace-period rejoin right.
    pub async fn cancel(&self, confirmation: Confirmation) -> Result<(), AgentError> {
        if confirmation != Confirmation::Confirmed {
            return Err(AgentError::ConfirmationRequired);
        }
        let token = self.session_token().ok_or(AgentError::NoSession)?;

        let url = format!("{}/api/v1/session/{token}/cancel", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "confirmed": true }))
            .send()
            .await?;
        let _: serde_json::Value = expect_data(response).await?;

        if let Some(mut snapshot) = self.snapshot() {
            snapshot.state = "cancelled".to_string();
            self.set_snapshot(snapshot);
        }
        tracing::info!("Entry cancelled, grace window open");
        Ok(())
    }

    /// Rejoin within the grace window, recovering the original position.
    pub async fn restore(&self) -> Result<ClientSnapshot, AgentError> {
        let token = self.session_token().ok_or(AgentError::NoSession)?;

        let url = format!("{}/api/v1/session/{token}/restore", self.base_url);
        let response = self.http.post(&url).send().await?;
        let snapshot: ClientSnapshot = expect_data(response).await?;

        self.set_snapshot(snapshot.clone());
        tracing::info!(position = snapshot.position, "Session restored");
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Live channel
    // -----------------------------------------------------------------------

    /// Keep the live channel open until cancelled.
    ///
    /// Reconnects with a fixed delay when the connection drops; each
    /// (re)connection re-registers the session token and reconciles against
    /// the `recovery-success` snapshot, which covers any events missed while
    /// offline.
    pub async fn run_channel(&self, cancel: CancellationToken) {
        loop {
            let Some(token) = self.session_token() else {
                tracing::info!("No session to watch, live channel stopping");
                return;
            };

            tracing::info!(url = %self.ws_url, "Connecting live channel");
            match connect_async(&self.ws_url).await {
                Ok((ws_stream, _response)) => {
                    tracing::info!("Live channel connected");
                    if self.run_session(ws_stream, &token, &cancel).await {
                        tracing::info!("Live channel finished");
                        return;
                    }
                    tracing::warn!("Live channel ended, reconnecting");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Live channel connection failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    /// Drive one live-channel session.
    ///
    /// Returns `true` when the channel should stop for good (cancelled by
    /// the caller, session over, or registration refused) and `false` when a
    /// reconnect is worth attempting.
    async fn run_session(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        token: &str,
        cancel: &CancellationToken,
    ) -> bool {
        let (mut sink, mut stream) = ws_stream.split();

        let register = ClientFrame::Register {
            session_token: token.to_string(),
        };
        if sink.send(Message::Text(to_frame(&register))).await.is_err() {
            return false;
        }

        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await; // first tick fires immediately, skip it

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return true;
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Text(to_frame(&ClientFrame::Heartbeat))).await.is_err() {
                        tracing::debug!("Heartbeat send failed");
                        return false;
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => {
                                    if self.apply_event(event) {
                                        let _ = sink.send(Message::Close(None)).await;
                                        return true;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, raw = %text, "Unknown or malformed frame");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                            // Handled automatically by tungstenite.
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server closed live channel");
                            return false;
                        }
                        Some(Ok(_)) => {
                            // Binary / Frame -- ignore.
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Live channel receive error");
                            return false;
                        }
                        None => {
                            tracing::info!("Live channel stream exhausted");
                            return false;
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Fold a pushed event into the snapshot, persist, and mirror.
    ///
    /// Returns `true` when the channel should close (session is over).
    pub fn apply_event(&self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::RecoverySuccess { snapshot } => {
                tracing::info!(position = snapshot.position, "Live channel registered");
                self.set_snapshot(snapshot);
                false
            }
            ServerEvent::EntryCalled { verification_code } => {
                if let Some(mut snapshot) = self.snapshot() {
                    snapshot.state = "called".to_string();
                    snapshot.verification_code = verification_code;
                    tracing::info!(code = %snapshot.verification_code, "It's your turn");
                    self.set_snapshot(snapshot);
                }
                false
            }
            ServerEvent::PositionChanged { position } => {
                if let Some(mut snapshot) = self.snapshot() {
                    // A position push while called means the call timed out
                    // and the entry is back in line.
                    if snapshot.state == "called" {
                        snapshot.state = "waiting".to_string();
                    }
                    snapshot.position = position;
                    self.set_snapshot(snapshot);
                }
                false
            }
            ServerEvent::EntryRemoved { reason } => {
                tracing::info!(reason = %reason, "Entry left the queue");
                if reason == "cancelled" {
                    // Keep the token: it carries the grace-period rejoin
                    // right. Only the snapshot state changes.
                    if let Some(mut snapshot) = self.snapshot() {
                        snapshot.state = "cancelled".to_string();
                        self.set_snapshot(snapshot);
                    }
                } else {
                    self.clear_session();
                    self.mirror.publish(TabEvent::SessionEnded);
                }
                self.mirror.publish(TabEvent::Removed { reason });
                true
            }
            ServerEvent::Error { code, message } => {
                // Registration refused. The token may still carry a grace
                // right, so nothing is cleared here; `recover()` decides.
                tracing::warn!(code = %code, message = %message, "Live channel refused");
                true
            }
        }
    }

    /// Replace the snapshot, persist it, and mirror it to sibling tabs.
    fn set_snapshot(&self, snapshot: ClientSnapshot) {
        if let Ok(json) = serde_json::to_string(&snapshot) {
            self.store.set(KEY_SNAPSHOT, &json);
        }
        *self.snapshot.lock().expect("snapshot lock poisoned") = Some(snapshot.clone());
        self.mirror.publish(TabEvent::Snapshot(snapshot));
    }

    /// Forget the persisted session entirely.
    fn clear_session(&self) {
        self.store.remove(KEY_SESSION_TOKEN);
        self.store.remove(KEY_SNAPSHOT);
        *self.snapshot.lock().expect("snapshot lock poisoned") = None;
    }
}

/// Serialize an outgoing frame.
fn to_frame(frame: &ClientFrame) -> String {
    serde_json::to_string(frame).expect("ClientFrame is always serialisable")
}

/// Unwrap a `{ "data": ... }` envelope, turning error bodies into
/// [`AgentError::Api`].
async fn expect_data<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AgentError> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        let message = body["error"]
            .as_str()
            .unwrap_or("Unknown server error")
            .to_string();
        return Err(AgentError::Api {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_value(body["data"].clone()).map_err(|e| AgentError::Api {
        status: status.as_u16(),
        message: format!("Malformed response body: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
