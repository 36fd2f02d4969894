use std::sync::Arc;

use waitline_core::config::{InMemoryDirectory, QueueDirectory};
use waitline_core::idle::IdleSessionGuard;
use waitline_core::recovery::SessionRecoveryRegistry;
use waitline_core::store::QueueEntryStore;
use waitline_core::timeout::CallTimeouts;
use waitline_events::EventBus;

use crate::config::ServerConfig;
use crate::ws::ConnectionManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Queue configuration directory (stand-in for the merchant CRUD module).
    pub directory: Arc<InMemoryDirectory>,
    /// Authoritative entry store.
    pub store: Arc<QueueEntryStore>,
    /// Session token registry.
    pub registry: Arc<SessionRecoveryRegistry>,
    /// Event bus the store publishes on.
    pub bus: Arc<EventBus>,
    /// Live WebSocket connections (browser tabs).
    pub connections: Arc<ConnectionManager>,
    /// Pending call-timeout tasks.
    pub timeouts: Arc<CallTimeouts>,
    /// Dashboard idle-session guard.
    pub idle: Arc<IdleSessionGuard>,
}

impl AppState {
    /// Wire up the full engine from configuration.
    ///
    /// Seeds the in-memory directory with the configured queues.
    pub fn from_config(config: ServerConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        for queue_id in &config.queue.seed_queue_ids {
            directory.insert(*queue_id, config.queue.to_queue_config());
        }

        let bus = Arc::new(EventBus::default());
        let store = Arc::new(QueueEntryStore::new(
            Arc::clone(&directory) as Arc<dyn QueueDirectory>,
            Arc::clone(&bus),
            config.queue.code_length,
        ));
        let registry = Arc::new(SessionRecoveryRegistry::new(Arc::clone(&store)));
        let idle = Arc::new(IdleSessionGuard::new(config.idle));

        Self {
            config: Arc::new(config),
            directory,
            store,
            registry,
            bus,
            connections: Arc::new(ConnectionManager::new()),
            timeouts: Arc::new(CallTimeouts::new()),
            idle,
        }
    }
}
