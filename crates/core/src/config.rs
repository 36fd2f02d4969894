//! Queue configuration and the directory that supplies it.
//!
//! Queue records themselves (names, opening hours, branding) belong to the
//! merchant CRUD module, which is outside this engine. The engine only reads
//! the handful of knobs that govern line behaviour, through the
//! [`QueueDirectory`] trait, so tests and the production wiring can inject
//! whatever backing they want.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::types::DbId;

/// Per-queue behaviour knobs, supplied by the merchant configuration module.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Whether the queue accepts new entries.
    pub open: bool,
    /// Maximum number of simultaneously active entries. `None` is unlimited.
    pub capacity: Option<u32>,
    /// Whether only one entry may be in the `called` state at a time.
    pub single_called: bool,
    /// Auto-revert an unacknowledged call after this long. `None` disables.
    pub call_timeout: Option<Duration>,
    /// How long a cancelled entry may rejoin without losing its position.
    pub grace_period: Duration,
    /// How long terminal entries are retained before the sweeper archives them.
    pub retention: Duration,
    /// Reject a join whose contact handle already has an active entry.
    pub reject_duplicate_contact: bool,
    /// Average per-party service time used for wait estimates.
    pub avg_service_time: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            open: true,
            capacity: None,
            single_called: true,
            call_timeout: None,
            grace_period: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
            reject_duplicate_contact: true,
            avg_service_time: Duration::from_secs(600),
        }
    }
}

/// Read access to queue configuration.
///
/// Implementations must be cheap to call: the store consults the directory
/// while holding a per-queue lock.
pub trait QueueDirectory: Send + Sync {
    /// Configuration for `queue_id`, or `None` if the queue does not exist.
    fn get(&self, queue_id: DbId) -> Option<QueueConfig>;
}

/// In-memory [`QueueDirectory`] seeded at startup.
///
/// Stands in for the merchant CRUD module in the production wiring and in
/// tests. Open/closed state can be flipped at runtime.
#[derive(Default)]
pub struct InMemoryDirectory {
    queues: RwLock<HashMap<DbId, QueueConfig>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a queue's configuration.
    pub fn insert(&self, queue_id: DbId, config: QueueConfig) {
        self.queues
            .write()
            .expect("directory lock poisoned")
            .insert(queue_id, config);
    }

    /// Flip a queue's open/closed state. Returns `false` for unknown queues.
    pub fn set_open(&self, queue_id: DbId, open: bool) -> bool {
        match self
            .queues
            .write()
            .expect("directory lock poisoned")
            .get_mut(&queue_id)
        {
            Some(config) => {
                config.open = open;
                true
            }
            None => false,
        }
    }
}

impl QueueDirectory for InMemoryDirectory {
    fn get(&self, queue_id: DbId) -> Option<QueueConfig> {
        self.queues
            .read()
            .expect("directory lock poisoned")
            .get(&queue_id)
            .cloned()
    }
}
