//! Periodic storage reclamation.
//!
//! Grace deadlines and retention windows are enforced lazily on access; this
//! sweep exists to reclaim storage for sessions and entries nobody touches
//! again. It is deliberately coarse -- a wall-clock comparison on an
//! interval, not a precise timer.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use waitline_core::idle::IdleSessionGuard;
use waitline_core::recovery::SessionRecoveryRegistry;
use waitline_core::store::QueueEntryStore;

/// Background task that reclaims expired bindings, archived entries, and
/// idled-out dashboard sessions.
pub struct Sweeper {
    store: Arc<QueueEntryStore>,
    registry: Arc<SessionRecoveryRegistry>,
    idle: Arc<IdleSessionGuard>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<QueueEntryStore>,
        registry: Arc<SessionRecoveryRegistry>,
        idle: Arc<IdleSessionGuard>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            idle,
            interval,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let now = chrono::Utc::now();
                    let entries = self.store.archive_expired(now).await;
                    let sessions = self.registry.sweep(now).await;
                    let idle = self.idle.sweep(now);
                    if entries + sessions + idle > 0 {
                        tracing::debug!(entries, sessions, idle, "Sweep reclaimed storage");
                    }
                }
            }
        }
    }
}
