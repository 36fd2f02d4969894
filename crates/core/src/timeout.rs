//! Cancellable per-entry call-timeout tasks.
//!
//! When a merchant calls an entry and the queue configures a call timeout,
//! the engine schedules a task that reverts the entry to `waiting` if the
//! merchant has not confirmed seating in time. Seating or cancelling the
//! entry aborts the task.
//!
//! Tasks are keyed per entry and explicitly cancellable, rather than timers
//! scattered through handler code.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::types::DbId;

/// Registry of pending call-timeout tasks, one per entry at most.
#[derive(Default)]
pub struct CallTimeouts {
    /// Entry id -> (generation, token). The generation lets a fired task
    /// clean up after itself without racing a newer schedule for the same
    /// entry.
    tasks: Arc<Mutex<HashMap<DbId, (u64, CancellationToken)>>>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl CallTimeouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_timeout` to run after `delay` unless cancelled first.
    ///
    /// Replaces (and cancels) any pending task for the same entry.
    pub fn schedule<F>(&self, entry_id: DbId, delay: Duration, on_timeout: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let token = CancellationToken::new();

        let replaced = self
            .tasks
            .lock()
            .expect("timeout lock poisoned")
            .insert(entry_id, (generation, token.clone()));
        if let Some((_, previous)) = replaced {
            previous.cancel();
        }

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Deregister before running so a re-schedule from within
                    // `on_timeout` is not clobbered.
                    Self::deregister(&tasks, entry_id, generation);
                    on_timeout.await;
                }
            }
        });
    }

    /// Remove the registry entry for `entry_id` if it still matches
    /// `generation`, so a re-schedule for the same entry is not clobbered.
    fn deregister(
        tasks: &Mutex<HashMap<DbId, (u64, CancellationToken)>>,
        entry_id: DbId,
        generation: u64,
    ) {
        let mut tasks = tasks.lock().expect("timeout lock poisoned");
        if matches!(tasks.get(&entry_id), Some((current, _)) if *current == generation) {
            tasks.remove(&entry_id);
        }
    }

    /// Cancel the pending task for an entry, if any. Returns whether one was
    /// pending.
    pub fn cancel(&self, entry_id: DbId) -> bool {
        match self
            .tasks
            .lock()
            .expect("timeout lock poisoned")
            .remove(&entry_id)
        {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of pending timeout tasks.
    pub fn pending_count(&self) -> usize {
        self.tasks.lock().expect("timeout lock poisoned").len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_after_delay() {
        let timeouts = CallTimeouts::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        timeouts.schedule(1, Duration::from_secs(30), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(29)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timeouts.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let timeouts = CallTimeouts::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        timeouts.schedule(1, Duration::from_secs(30), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(timeouts.cancel(1));
        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timeouts.cancel(1), "already cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_previous_task() {
        let timeouts = CallTimeouts::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        timeouts.schedule(1, Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&fired);
        timeouts.schedule(1, Duration::from_secs(30), async move {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        tokio::task::yield_now().await;
        // The first task's deadline passes without firing.
        tokio::time::advance(Duration::from_secs(15)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_entries_do_not_interfere() {
        let timeouts = CallTimeouts::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        timeouts.schedule(1, Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&fired);
        timeouts.schedule(2, Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::task::yield_now().await;
        assert!(timeouts.cancel(1));
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
