//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`QueueEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.
//! Publishing never blocks and never fails: delivery to live connections is
//! best-effort by design, with client snapshot reconciliation as the backstop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// QueueEvent
// ---------------------------------------------------------------------------

/// Why an entry left the active portion of its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalReason {
    /// The merchant confirmed seating.
    Seated,
    /// The customer or merchant cancelled the entry.
    Cancelled,
}

/// The kind of change a [`QueueEvent`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QueueEventKind {
    /// The entry was called to the counter.
    EntryCalled {
        /// Code the customer reads back to staff.
        verification_code: String,
    },
    /// The entry's position in the line changed.
    PositionChanged {
        /// New 1-based position.
        position: u32,
    },
    /// The entry left the queue.
    EntryRemoved { reason: RemovalReason },
}

/// An immutable description of one queue-entry change.
///
/// Events are fire-and-forget: they are not persisted, and a missed event is
/// recovered by the client re-fetching its snapshot on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Queue the entry belongs to.
    pub queue_id: i64,
    /// Entry the change applies to.
    pub entry_id: i64,
    /// What changed.
    #[serde(flatten)]
    pub kind: QueueEventKind,
    /// When the change occurred (UTC).
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    /// Create an event stamped with the current time.
    pub fn new(queue_id: i64, entry_id: i64, kind: QueueEventKind) -> Self {
        Self {
            queue_id,
            entry_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`QueueEvent`]. The entry store
/// publishes while holding its per-queue lock, so subscribers observe events
/// for one queue in true state-change order.
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: QueueEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(QueueEvent::new(
            1,
            42,
            QueueEventKind::EntryCalled {
                verification_code: "K7M2".to_string(),
            },
        ));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.queue_id, 1);
        assert_eq!(received.entry_id, 42);
        assert!(matches!(
            received.kind,
            QueueEventKind::EntryCalled { ref verification_code } if verification_code == "K7M2"
        ));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(QueueEvent::new(
            3,
            7,
            QueueEventKind::PositionChanged { position: 2 },
        ));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.entry_id, 7);
        assert_eq!(e2.entry_id, 7);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers — this must not panic.
        bus.publish(QueueEvent::new(
            1,
            1,
            QueueEventKind::EntryRemoved {
                reason: RemovalReason::Cancelled,
            },
        ));
    }

    #[test]
    fn event_kind_serializes_with_kebab_case_tag() {
        let event = QueueEvent::new(
            1,
            9,
            QueueEventKind::EntryRemoved {
                reason: RemovalReason::Seated,
            },
        );

        let json = serde_json::to_value(&event).expect("event is always serialisable");
        assert_eq!(json["kind"], "entry-removed");
        assert_eq!(json["reason"], "seated");
        assert_eq!(json["entry_id"], 9);
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        for position in 1..=5u32 {
            bus.publish(QueueEvent::new(
                1,
                1,
                QueueEventKind::PositionChanged { position },
            ));
        }

        for expected in 1..=5u32 {
            let event = rx.recv().await.expect("should receive in order");
            assert!(matches!(
                event.kind,
                QueueEventKind::PositionChanged { position } if position == expected
            ));
        }
    }
}
