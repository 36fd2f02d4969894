//! Tab-to-tab mirroring.
//!
//! An event received on one tab's live channel is re-published here so
//! sibling tabs converge without each needing its own server round-trip.
//! This is the local observer abstraction, deliberately decoupled from the
//! network transport.

use tokio::sync::broadcast;

use crate::agent::ClientSnapshot;

/// Default buffer capacity for the mirror channel.
const DEFAULT_CAPACITY: usize = 64;

/// An update mirrored to sibling tabs.
#[derive(Debug, Clone)]
pub enum TabEvent {
    /// The session's snapshot changed (position, state, or call).
    Snapshot(ClientSnapshot),
    /// The entry left the queue (`"seated"` or `"cancelled"`).
    Removed { reason: String },
    /// The session is gone; tabs should show the rejoin affordance.
    SessionEnded,
}

/// Same-origin broadcast hub every tab subscribes to.
pub struct TabMirror {
    sender: broadcast::Sender<TabEvent>,
}

impl TabMirror {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an update to all sibling tabs.
    ///
    /// With no subscribers the update is silently dropped.
    pub fn publish(&self, event: TabEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe a tab to mirrored updates.
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.sender.subscribe()
    }
}

impl Default for TabMirror {
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

    fn snapshot() -> ClientSnapshot {
        ClientSnapshot {
            queue_id: 1,
            entry_id: 2,
            state: "waiting".to_string(),
            position: 3,
            verification_code: "K7M2".to_string(),
            estimated_wait_secs: 1200,
        }
    }

    #[tokio::test]
    async fn sibling_tabs_receive_mirrored_snapshot() {
        let mirror = TabMirror::default();
        let mut tab1 = mirror.subscribe();
        let mut tab2 = mirror.subscribe();

        mirror.publish(TabEvent::Snapshot(snapshot()));

        for rx in [&mut tab1, &mut tab2] {
            let event = rx.recv().await.expect("tab should receive");
            assert!(matches!(event, TabEvent::Snapshot(s) if s.position == 3));
        }
    }

    #[test]
    fn publish_with_no_tabs_does_not_panic() {
        let mirror = TabMirror::default();
        mirror.publish(TabEvent::SessionEnded);
    }
}
