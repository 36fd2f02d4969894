//! Session recovery registry.
//!
//! Maps opaque session tokens to queue entries so a customer can survive
//! reloads, crashes, and disconnects. A token is issued at join time and
//! stays valid for the entry's lifetime; after a cancellation it converts to
//! a grace binding that allows one rejoin before a wall-clock deadline.
//!
//! Lookup failure is uniform: an expired grace binding, a token whose entry
//! was seated long ago, and a forged token all produce
//! [`CoreError::SessionNotFound`]. Nothing in the error distinguishes the
//! cases, so tokens cannot be used to probe other customers' entries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entry::{EntrySnapshot, QueueEntry};
use crate::error::{CoreError, CoreResult};
use crate::store::{NewEntry, QueueEntryStore, RestoreTemplate};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Validity policy of a session binding.
#[derive(Debug, Clone)]
pub enum BindingPolicy {
    /// Valid for the bound entry's lifetime.
    Active,
    /// Valid for a bounded window after cancellation; a rejoin before the
    /// deadline re-creates the entry from the captured template.
    Grace {
        deadline: Timestamp,
        template: RestoreTemplate,
    },
}

/// One session token's binding to a queue entry.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub token: String,
    pub entry_id: DbId,
    pub queue_id: DbId,
    pub created_at: Timestamp,
    pub last_seen_at: Timestamp,
    pub policy: BindingPolicy,
}

/// Result of a successful join: the entry snapshot plus the token the client
/// must persist to recover the session later.
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub session_token: String,
    pub snapshot: EntrySnapshot,
}

/// What a session token currently resolves to.
#[derive(Debug, Clone)]
pub enum SessionStatus {
    /// Bound to a live entry.
    Active(EntrySnapshot),
    /// Bound to a cancelled entry still inside its grace window; `restore`
    /// will re-admit it.
    Restorable { queue_id: DbId, deadline: Timestamp },
}

/// Receipt for a customer cancellation.
#[derive(Debug, Clone)]
pub struct CancelReceipt {
    /// The entry that was cancelled.
    pub entry_id: DbId,
    /// Rejoining is possible until this instant.
    pub deadline: Timestamp,
}

// ---------------------------------------------------------------------------
// SessionRecoveryRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    bindings: HashMap<String, SessionBinding>,
    /// Entry id -> token, for both active and grace bindings. Exactly one
    /// token resolves to a given entry at a time.
    by_entry: HashMap<DbId, String>,
}

/// Issues session tokens and resolves them back to entries.
///
/// Expiry is lazy: every resolution checks the wall clock and prunes what it
/// finds stale, and a periodic [`sweep`](SessionRecoveryRegistry::sweep)
/// reclaims the rest.
pub struct SessionRecoveryRegistry {
    store: Arc<QueueEntryStore>,
    inner: RwLock<Inner>,
}

impl SessionRecoveryRegistry {
    pub fn new(store: Arc<QueueEntryStore>) -> Self {
        Self {
            store,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Join a queue and bind a fresh session token to the new entry.
    pub async fn join(&self, queue_id: DbId, new: NewEntry) -> CoreResult<JoinedSession> {
        let entry = self.store.join(queue_id, new).await?;
        let snapshot = self.store.snapshot(entry.id).await?;

        let token = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let binding = SessionBinding {
            token: token.clone(),
            entry_id: entry.id,
            queue_id,
            created_at: now,
            last_seen_at: now,
            policy: BindingPolicy::Active,
        };

        let mut inner = self.inner.write().await;
        inner.by_entry.insert(entry.id, token.clone());
        inner.bindings.insert(token.clone(), binding);

        tracing::debug!(queue_id, entry_id = entry.id, "Session bound to entry");
        Ok(JoinedSession {
            session_token: token,
            snapshot,
        })
    }

    /// Resolve a token to its current status.
    ///
    /// Refreshes `last_seen_at` on success. Unknown, forged, expired, and
    /// stale-terminal tokens all fail with the uniform
    /// [`CoreError::SessionNotFound`].
    pub async fn status(&self, token: &str, now: Timestamp) -> CoreResult<SessionStatus> {
        let (entry_id, policy) = {
            let inner = self.inner.read().await;
            let binding = inner.bindings.get(token).ok_or(CoreError::SessionNotFound)?;
            (binding.entry_id, binding.policy.clone())
        };

        match policy {
            BindingPolicy::Active => match self.store.snapshot(entry_id).await {
                Ok(snapshot) if snapshot.state.is_active() => {
                    self.touch(token, now).await;
                    Ok(SessionStatus::Active(snapshot))
                }
                // Entry seated, archived, or its queue gone: the binding is
                // stale. Prune and fail uniformly.
                _ => {
                    self.prune(token).await;
                    Err(CoreError::SessionNotFound)
                }
            },
            BindingPolicy::Grace { deadline, .. } => {
                if now <= deadline {
                    self.touch(token, now).await;
                    let queue_id = self
                        .inner
                        .read()
                        .await
                        .bindings
                        .get(token)
                        .map(|b| b.queue_id)
                        .ok_or(CoreError::SessionNotFound)?;
                    Ok(SessionStatus::Restorable { queue_id, deadline })
                } else {
                    self.prune(token).await;
                    Err(CoreError::SessionNotFound)
                }
            }
        }
    }

    /// Cancel the entry bound to `token`, converting the binding to a grace
    /// binding.
    pub async fn cancel(&self, token: &str, now: Timestamp) -> CoreResult<CancelReceipt> {
        let entry_id = match self.status(token, now).await? {
            SessionStatus::Active(snapshot) => snapshot.entry_id,
            // Already cancelled: cancelling again is not a transition.
            SessionStatus::Restorable { .. } => {
                return Err(CoreError::InvalidTransition(
                    "cancelled -> cancelled".to_string(),
                ))
            }
        };

        let cancelled = self.store.cancel(entry_id).await?;
        self.begin_grace(&cancelled).await;

        let deadline = cancelled
            .cancel_deadline
            .ok_or_else(|| CoreError::Internal("cancelled entry without deadline".to_string()))?;
        Ok(CancelReceipt {
            entry_id: cancelled.id,
            deadline,
        })
    }

    /// Convert the binding for a just-cancelled entry into a grace binding.
    ///
    /// Called for merchant-initiated cancellations too, so the customer's
    /// token keeps its rejoin right no matter who cancelled. A cancelled
    /// entry without a binding (none was ever issued, or it was pruned) is a
    /// no-op.
    pub async fn begin_grace(&self, cancelled: &QueueEntry) {
        let Some(deadline) = cancelled.cancel_deadline else {
            return;
        };
        let template = RestoreTemplate {
            queue_id: cancelled.queue_id,
            display_name: cancelled.display_name.clone(),
            contact: cancelled.contact.clone(),
            party_size: cancelled.party_size,
            order_key: cancelled.order_key,
            verification_code: cancelled.verification_code.clone(),
        };

        let mut inner = self.inner.write().await;
        let Some(token) = inner.by_entry.get(&cancelled.id).cloned() else {
            return;
        };
        if let Some(binding) = inner.bindings.get_mut(&token) {
            binding.policy = BindingPolicy::Grace { deadline, template };
            tracing::debug!(
                entry_id = cancelled.id,
                queue_id = cancelled.queue_id,
                "Session converted to grace binding"
            );
        }
    }

    /// Rejoin within the grace window, preserving the original position.
    ///
    /// The same token stays valid and is re-bound to the replacement entry.
    /// Past the deadline this fails with the uniform
    /// [`CoreError::SessionNotFound`]; admission conflicts (queue closed or
    /// full again) surface as their own errors.
    pub async fn restore(&self, token: &str, now: Timestamp) -> CoreResult<EntrySnapshot> {
        // Decide under the read lock, act after releasing it.
        let template = {
            let inner = self.inner.read().await;
            let binding = inner.bindings.get(token).ok_or(CoreError::SessionNotFound)?;
            match &binding.policy {
                BindingPolicy::Grace { deadline, template } if now <= *deadline => {
                    Some(template.clone())
                }
                BindingPolicy::Grace { .. } => None,
                // An active binding has nothing to restore.
                BindingPolicy::Active => return Err(CoreError::SessionNotFound),
            }
        };
        let Some(template) = template else {
            self.prune(token).await;
            return Err(CoreError::SessionNotFound);
        };

        let restored = self.store.restore(&template).await?;

        let mut inner = self.inner.write().await;
        let old_entry_id = inner.bindings.get(token).map(|b| b.entry_id);
        if let Some(binding) = inner.bindings.get_mut(token) {
            binding.entry_id = restored.id;
            binding.policy = BindingPolicy::Active;
            binding.last_seen_at = now;
        }
        if let Some(old) = old_entry_id {
            inner.by_entry.remove(&old);
        }
        inner.by_entry.insert(restored.id, token.to_string());
        drop(inner);

        tracing::info!(
            entry_id = restored.id,
            queue_id = restored.queue_id,
            position = restored.position,
            "Session restored within grace period"
        );
        self.store.snapshot(restored.id).await
    }

    /// Refresh a binding's `last_seen_at` (status checks and heartbeats).
    pub async fn touch(&self, token: &str, now: Timestamp) {
        if let Some(binding) = self.inner.write().await.bindings.get_mut(token) {
            binding.last_seen_at = now;
        }
    }

    /// The token currently bound to an entry, if any.
    ///
    /// Used by the notification dispatcher to target delivery; includes grace
    /// bindings so a cancellation's own `entry-removed` event still reaches
    /// the cancelling customer's tabs.
    pub async fn token_for_entry(&self, entry_id: DbId) -> Option<String> {
        self.inner.read().await.by_entry.get(&entry_id).cloned()
    }

    /// A copy of the binding for a token. Mainly for diagnostics and tests.
    pub async fn binding(&self, token: &str) -> Option<SessionBinding> {
        self.inner.read().await.bindings.get(token).cloned()
    }

    /// Number of live bindings.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.bindings.len()
    }

    /// Drop expired grace bindings and bindings whose entry no longer exists.
    ///
    /// Returns the number of bindings removed.
    pub async fn sweep(&self, now: Timestamp) -> usize {
        let candidates: Vec<(String, DbId, bool)> = {
            let inner = self.inner.read().await;
            inner
                .bindings
                .values()
                .map(|b| {
                    let expired = matches!(&b.policy, BindingPolicy::Grace { deadline, .. } if now > *deadline);
                    (b.token.clone(), b.entry_id, expired)
                })
                .collect()
        };

        let mut stale = Vec::new();
        for (token, entry_id, expired) in candidates {
            if expired || self.store.entry(entry_id).await.is_err() {
                stale.push(token);
            }
        }

        let removed = stale.len();
        for token in stale {
            self.prune(&token).await;
        }
        if removed > 0 {
            tracing::debug!(removed, "Swept stale session bindings");
        }
        removed
    }

    /// Remove a binding and its entry index.
    async fn prune(&self, token: &str) {
        let mut inner = self.inner.write().await;
        if let Some(binding) = inner.bindings.remove(token) {
            // Only clear the index if it still points at this token.
            if inner.by_entry.get(&binding.entry_id) == Some(&binding.token) {
                inner.by_entry.remove(&binding.entry_id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{InMemoryDirectory, QueueConfig};
    use crate::entry::EntryState;
    use waitline_events::EventBus;

    const QUEUE: DbId = 1;

    fn new_entry(name: &str) -> NewEntry {
        NewEntry {
            display_name: name.to_string(),
            contact: format!("{name}@example.com"),
            party_size: 2,
        }
    }

    fn registry_with(config: QueueConfig) -> (SessionRecoveryRegistry, Arc<QueueEntryStore>) {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert(QUEUE, config);
        let bus = Arc::new(EventBus::default());
        let store = Arc::new(QueueEntryStore::new(directory, bus, 4));
        (SessionRecoveryRegistry::new(Arc::clone(&store)), store)
    }

    fn default_registry() -> (SessionRecoveryRegistry, Arc<QueueEntryStore>) {
        registry_with(QueueConfig::default())
    }

    #[tokio::test]
    async fn join_issues_token_resolving_to_entry() {
        let (registry, _store) = default_registry();

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        assert_eq!(joined.snapshot.position, 1);

        let status = registry
            .status(&joined.session_token, chrono::Utc::now())
            .await
            .expect("status");
        let SessionStatus::Active(snapshot) = status else {
            panic!("expected active status");
        };
        assert_eq!(snapshot.entry_id, joined.snapshot.entry_id);
        assert_eq!(snapshot.verification_code, joined.snapshot.verification_code);
    }

    #[tokio::test]
    async fn reconnect_resolves_to_same_entry_and_position() {
        let (registry, _store) = default_registry();

        let ada = registry.join(QUEUE, new_entry("ada")).await.expect("join a");
        registry.join(QUEUE, new_entry("bob")).await.expect("join b");

        // Simulate a reload: only the persisted token survives.
        let token = ada.session_token.clone();
        let status = registry.status(&token, chrono::Utc::now()).await.expect("status");
        let SessionStatus::Active(snapshot) = status else {
            panic!("expected active status");
        };
        assert_eq!(snapshot.entry_id, ada.snapshot.entry_id);
        assert_eq!(snapshot.position, 1);
        assert_eq!(snapshot.verification_code, ada.snapshot.verification_code);
    }

    #[tokio::test]
    async fn unknown_token_fails_uniformly() {
        let (registry, _store) = default_registry();

        let err = registry
            .status("not-a-token", chrono::Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound));
    }

    #[tokio::test]
    async fn expired_grace_fails_identically_to_forged_token() {
        let (registry, _store) = registry_with(QueueConfig {
            grace_period: Duration::ZERO,
            ..QueueConfig::default()
        });

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        registry
            .cancel(&joined.session_token, chrono::Utc::now())
            .await
            .expect("cancel");

        let later = chrono::Utc::now() + Duration::from_secs(1);
        let expired_err = registry
            .status(&joined.session_token, later)
            .await
            .unwrap_err();
        let forged_err = registry.status("forged-token", later).await.unwrap_err();

        // The two failures must be indistinguishable.
        assert_eq!(expired_err.to_string(), forged_err.to_string());
        assert!(matches!(expired_err, CoreError::SessionNotFound));
    }

    #[tokio::test]
    async fn cancel_opens_grace_window_reported_as_restorable() {
        let (registry, _store) = registry_with(QueueConfig {
            grace_period: Duration::from_secs(300),
            ..QueueConfig::default()
        });

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        let now = chrono::Utc::now();
        let receipt = registry
            .cancel(&joined.session_token, now)
            .await
            .expect("cancel");
        assert!(receipt.deadline > now);

        let status = registry
            .status(&joined.session_token, now)
            .await
            .expect("status");
        assert!(matches!(status, SessionStatus::Restorable { queue_id, .. } if queue_id == QUEUE));
    }

    #[tokio::test]
    async fn restore_before_deadline_preserves_position() {
        let (registry, store) = default_registry();

        let ada = registry.join(QUEUE, new_entry("ada")).await.expect("join a");
        registry.join(QUEUE, new_entry("bob")).await.expect("join b");

        let now = chrono::Utc::now();
        registry.cancel(&ada.session_token, now).await.expect("cancel");

        let snapshot = registry
            .restore(&ada.session_token, now)
            .await
            .expect("restore");
        assert_eq!(snapshot.position, 1, "original position is preserved");
        assert_eq!(snapshot.state, EntryState::Waiting);
        assert_eq!(
            snapshot.verification_code,
            ada.snapshot.verification_code
        );

        // The token now resolves to the replacement entry.
        let status = registry
            .status(&ada.session_token, chrono::Utc::now())
            .await
            .expect("status");
        let SessionStatus::Active(active) = status else {
            panic!("expected active status");
        };
        assert_eq!(active.entry_id, snapshot.entry_id);
        assert_ne!(active.entry_id, ada.snapshot.entry_id);

        // The entry index follows the rebind.
        assert_eq!(
            registry.token_for_entry(snapshot.entry_id).await.as_deref(),
            Some(ada.session_token.as_str())
        );
        assert!(registry
            .token_for_entry(ada.snapshot.entry_id)
            .await
            .is_none());
        assert_eq!(store.active_count(QUEUE).await, 2);
    }

    #[tokio::test]
    async fn restore_after_deadline_requires_fresh_join() {
        let (registry, _store) = registry_with(QueueConfig {
            grace_period: Duration::ZERO,
            ..QueueConfig::default()
        });

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        registry
            .cancel(&joined.session_token, chrono::Utc::now())
            .await
            .expect("cancel");

        let later = chrono::Utc::now() + Duration::from_secs(1);
        let err = registry
            .restore(&joined.session_token, later)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound));

        // A fresh join still works.
        registry.join(QUEUE, new_entry("ada")).await.expect("rejoin");
    }

    #[tokio::test]
    async fn seated_entry_token_fails_uniformly() {
        let (registry, store) = default_registry();

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        store.call(joined.snapshot.entry_id).await.expect("call");
        store.seat(joined.snapshot.entry_id).await.expect("seat");

        let err = registry
            .status(&joined.session_token, chrono::Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound));

        // The stale binding was pruned on access.
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn merchant_cancel_converts_binding_via_begin_grace() {
        let (registry, store) = default_registry();

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");

        // Merchant-side cancellation goes through the store directly.
        let cancelled = store.cancel(joined.snapshot.entry_id).await.expect("cancel");
        registry.begin_grace(&cancelled).await;

        let status = registry
            .status(&joined.session_token, chrono::Utc::now())
            .await
            .expect("status");
        assert!(matches!(status, SessionStatus::Restorable { .. }));
    }

    #[tokio::test]
    async fn grace_binding_still_targets_cancelled_entry() {
        let (registry, _store) = default_registry();

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        registry
            .cancel(&joined.session_token, chrono::Utc::now())
            .await
            .expect("cancel");

        // Event delivery for the cancelled entry still reaches this token.
        assert_eq!(
            registry
                .token_for_entry(joined.snapshot.entry_id)
                .await
                .as_deref(),
            Some(joined.session_token.as_str())
        );
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_grace_bindings() {
        let (registry, _store) = registry_with(QueueConfig {
            grace_period: Duration::ZERO,
            ..QueueConfig::default()
        });

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        registry
            .cancel(&joined.session_token, chrono::Utc::now())
            .await
            .expect("cancel");
        assert_eq!(registry.session_count().await, 1);

        let removed = registry
            .sweep(chrono::Utc::now() + Duration::from_secs(1))
            .await;
        assert_eq!(removed, 1);
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn touch_refreshes_last_seen() {
        let (registry, _store) = default_registry();

        let joined = registry.join(QUEUE, new_entry("ada")).await.expect("join");
        let before = registry
            .binding(&joined.session_token)
            .await
            .expect("binding")
            .last_seen_at;

        let later = before + Duration::from_secs(30);
        registry.touch(&joined.session_token, later).await;

        let after = registry
            .binding(&joined.session_token)
            .await
            .expect("binding")
            .last_seen_at;
        assert_eq!(after, later);
    }
}
