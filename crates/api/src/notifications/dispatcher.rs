//! Event-to-connection routing engine.
//!
//! [`NotificationDispatcher`] subscribes to the queue event bus and pushes
//! each event to exactly the live connections whose session binding resolves
//! to the event's entry: every tab of the affected customer, and nobody
//! else's. Delivery is at-most-once per connection per event; failed sends
//! are dropped and never surface to the mutation that triggered them --
//! clients reconcile through their snapshot on reconnect.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;
use waitline_core::recovery::SessionRecoveryRegistry;
use waitline_events::QueueEvent;

use crate::ws::protocol::ServerMessage;
use crate::ws::ConnectionManager;

/// Routes queue events to the affected customer's connections.
pub struct NotificationDispatcher {
    registry: Arc<SessionRecoveryRegistry>,
    connections: Arc<ConnectionManager>,
}

impl NotificationDispatcher {
    /// Create a new dispatcher over the given registry and connection
    /// manager.
    pub fn new(
        registry: Arc<SessionRecoveryRegistry>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            registry,
            connections,
        }
    }

    /// Run the main dispatch loop.
    ///
    /// Consumes events from `receiver` until the channel closes. A single
    /// consumer task processes the bus in publish order, and each
    /// connection's channel is FIFO, so one entry's events reach a given
    /// connection in true state-change order.
    pub async fn run(self, mut receiver: broadcast::Receiver<QueueEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.dispatch(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Dropped events are recovered by client reconciliation.
                    tracing::warn!(skipped = n, "Notification dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver one event to every connection of the bound session.
    async fn dispatch(&self, event: &QueueEvent) {
        // Resolve the entry to its session token. No binding means nobody is
        // listening (entry joined without a client, or the binding was swept).
        let Some(token) = self.registry.token_for_entry(event.entry_id).await else {
            tracing::trace!(entry_id = event.entry_id, "No session bound to entry");
            return;
        };

        let frame = ServerMessage::from_event(event).to_json();
        let delivered = self
            .connections
            .send_to_session(&token, Message::Text(frame.into()))
            .await;

        tracing::debug!(
            entry_id = event.entry_id,
            queue_id = event.queue_id,
            delivered,
            "Dispatched queue event"
        );
    }
}
