//! Durable client-side state.
//!
//! Models the browser's per-origin key-value storage: namespaced string
//! keys, and graceful degradation to "absent" whenever the backing storage
//! is unavailable, corrupt, or cleared. Nothing here is allowed to fail the
//! caller -- losing persisted state only costs a rejoin.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Namespaced key for the persisted session token.
pub const KEY_SESSION_TOKEN: &str = "waitline.session_token";

/// Namespaced key for the last known snapshot (JSON).
pub const KEY_SNAPSHOT: &str = "waitline.snapshot";

/// Client-side key-value persistence.
pub trait StateStore: Send + Sync {
    /// The stored value, or `None` if absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;
    /// Store a value. Failures are swallowed (storage may be disabled).
    fn set(&self, key: &str, value: &str);
    /// Remove a value if present.
    fn remove(&self, key: &str);
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Volatile in-memory store, for tests and incognito-like sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().expect("store lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.map.lock().expect("store lock poisoned").remove(key);
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// File-backed store holding one JSON object of key-value pairs.
///
/// Every read reloads the file, so independent processes (sibling "tabs")
/// observe each other's writes. A missing, unreadable, or corrupt file reads
/// as empty.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> HashMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "Corrupt state file, starting empty");
            HashMap::new()
        })
    }

    fn save(&self, map: &HashMap<String, String>) {
        let json = serde_json::to_string_pretty(map).expect("string map is always serialisable");
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not persist state");
        }
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.load();
        map.insert(key.to_string(), value.to_string());
        self.save(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.load();
        if map.remove(key).is_some() {
            self.save(&map);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
