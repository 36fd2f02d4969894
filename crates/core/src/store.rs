//! Authoritative queue entry store.
//!
//! [`QueueEntryStore`] owns every entry and is the single source of truth for
//! states and positions. Operations on one queue are serialized behind a
//! per-queue `Mutex`, so transitions and position recomputes are linearizable
//! within a queue while distinct queues proceed fully in parallel.
//!
//! Every mutation publishes its [`QueueEvent`]s on the injected bus *while
//! still holding the queue lock*. Publishing is a non-blocking
//! `broadcast::send`, so the mutation never waits on delivery, but subscribers
//! observe events for one entry in true state-change order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use waitline_events::{EventBus, QueueEvent, QueueEventKind, RemovalReason};

use crate::config::{QueueConfig, QueueDirectory};
use crate::entry::{state_machine, EntrySnapshot, EntryState, QueueEntry};
use crate::error::{CoreError, CoreResult};
use crate::types::{DbId, Timestamp};
use crate::verification;

/// Attempts to draw a verification code free among active entries before
/// giving up. With a 32^4..32^6 code space this bound is never reached in
/// practice.
const MAX_CODE_ATTEMPTS: usize = 64;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Input for [`QueueEntryStore::join`].
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub display_name: String,
    pub contact: String,
    pub party_size: u32,
}

/// Everything needed to re-create a cancelled entry in its original slot.
///
/// Captured by the session recovery registry at cancellation time so a
/// grace-period rejoin does not depend on the cancelled record still being
/// retained.
#[derive(Debug, Clone)]
pub struct RestoreTemplate {
    pub queue_id: DbId,
    pub display_name: String,
    pub contact: String,
    pub party_size: u32,
    /// Original ordering stamp; restoring with it puts the entry back in its
    /// old slot while keeping positions contiguous.
    pub order_key: i64,
    /// Original code, re-issued only if it meanwhile collides.
    pub verification_code: String,
}

// ---------------------------------------------------------------------------
// QueueEntryStore
// ---------------------------------------------------------------------------

/// One merchant queue's entries. Guarded by the per-queue mutex.
#[derive(Default)]
struct QueueLine {
    entries: HashMap<DbId, QueueEntry>,
}

impl QueueLine {
    fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.state.is_active()).count()
    }

    fn has_active_contact(&self, contact: &str) -> bool {
        let needle = contact.trim().to_lowercase();
        self.entries
            .values()
            .any(|e| e.state.is_active() && e.contact.trim().to_lowercase() == needle)
    }

    fn has_active_code(&self, code: &str) -> bool {
        self.entries
            .values()
            .any(|e| e.state.is_active() && verification::codes_match(&e.verification_code, code))
    }

    fn called_entry(&self) -> Option<&QueueEntry> {
        self.entries.values().find(|e| e.state == EntryState::Called)
    }
}

/// Authoritative state machine and position ledger for every waiting-line
/// entry.
///
/// Designed to be wrapped in `Arc` and shared across the application. Queue
/// configuration comes from the injected [`QueueDirectory`]; state-change
/// events go out on the injected [`EventBus`].
pub struct QueueEntryStore {
    directory: Arc<dyn QueueDirectory>,
    bus: Arc<EventBus>,
    /// Verification code length (clamped to 4..=6 at issue time).
    code_len: usize,
    /// Per-queue lines. The outer lock only guards the map shape; all entry
    /// mutation happens under the inner per-queue mutex.
    lines: RwLock<HashMap<DbId, Arc<Mutex<QueueLine>>>>,
    /// Entry id -> queue id, so merchant actions addressed by entry id can
    /// find the right line.
    queue_of: RwLock<HashMap<DbId, DbId>>,
    next_entry_id: AtomicI64,
    next_order_key: AtomicI64,
}

impl QueueEntryStore {
    pub fn new(directory: Arc<dyn QueueDirectory>, bus: Arc<EventBus>, code_len: usize) -> Self {
        Self {
            directory,
            bus,
            code_len,
            lines: RwLock::new(HashMap::new()),
            queue_of: RwLock::new(HashMap::new()),
            next_entry_id: AtomicI64::new(1),
            next_order_key: AtomicI64::new(1),
        }
    }

    // -----------------------------------------------------------------------
    // Customer-side mutations
    // -----------------------------------------------------------------------

    /// Append a new entry to the back of the line.
    ///
    /// Fails with [`CoreError::QueueNotFound`], [`CoreError::QueueClosed`],
    /// [`CoreError::QueueFull`], or [`CoreError::DuplicateEntry`] per the
    /// queue's configuration.
    pub async fn join(&self, queue_id: DbId, new: NewEntry) -> CoreResult<QueueEntry> {
        let config = self.config(queue_id)?;
        let line = self.line(queue_id).await;
        let mut line = line.lock().await;

        self.admit(&line, &config, &new.contact)?;

        let code = issue_unique_code(&line, self.code_len)?;
        let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let order_key = self.next_order_key.fetch_add(1, Ordering::Relaxed);

        let entry = QueueEntry {
            id,
            queue_id,
            display_name: new.display_name,
            contact: new.contact,
            party_size: new.party_size,
            state: EntryState::Waiting,
            position: 0,
            verification_code: code,
            order_key,
            created_at: chrono::Utc::now(),
            called_at: None,
            seated_at: None,
            cancelled_at: None,
            cancel_deadline: None,
        };

        line.entries.insert(id, entry);
        self.queue_of.write().await.insert(id, queue_id);
        recompute_positions(&mut line, queue_id, &self.bus);

        let entry = line.entries[&id].clone();
        tracing::info!(
            queue_id,
            entry_id = id,
            position = entry.position,
            "Entry joined queue"
        );
        Ok(entry)
    }

    /// Re-create a cancelled entry in its original slot during a grace-period
    /// rejoin.
    ///
    /// Allocates a fresh entry id but re-uses the template's `order_key` so
    /// the position recompute puts the entry back where it was. The original
    /// verification code is kept unless it now collides with an active entry.
    pub async fn restore(&self, template: &RestoreTemplate) -> CoreResult<QueueEntry> {
        let queue_id = template.queue_id;
        let config = self.config(queue_id)?;
        let line = self.line(queue_id).await;
        let mut line = line.lock().await;

        self.admit(&line, &config, &template.contact)?;

        let code = if line.has_active_code(&template.verification_code) {
            issue_unique_code(&line, self.code_len)?
        } else {
            template.verification_code.clone()
        };
        let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);

        let entry = QueueEntry {
            id,
            queue_id,
            display_name: template.display_name.clone(),
            contact: template.contact.clone(),
            party_size: template.party_size,
            state: EntryState::Waiting,
            position: 0,
            verification_code: code,
            order_key: template.order_key,
            created_at: chrono::Utc::now(),
            called_at: None,
            seated_at: None,
            cancelled_at: None,
            cancel_deadline: None,
        };

        line.entries.insert(id, entry);
        self.queue_of.write().await.insert(id, queue_id);
        recompute_positions(&mut line, queue_id, &self.bus);

        let entry = line.entries[&id].clone();
        tracing::info!(
            queue_id,
            entry_id = id,
            position = entry.position,
            "Entry restored within grace period"
        );
        Ok(entry)
    }

    /// Cancel an active entry, opening its grace window.
    ///
    /// The returned entry carries the `cancel_deadline` the recovery registry
    /// enforces.
    pub async fn cancel(&self, entry_id: DbId) -> CoreResult<QueueEntry> {
        let queue_id = self.queue_id_of(entry_id).await?;
        let config = self.config(queue_id)?;
        let line = self.line(queue_id).await;
        let mut line = line.lock().await;

        let entry = line
            .entries
            .get_mut(&entry_id)
            .ok_or(CoreError::EntryNotFound(entry_id))?;
        state_machine::validate_transition(entry.state, EntryState::Cancelled)
            .map_err(CoreError::InvalidTransition)?;

        let now = chrono::Utc::now();
        entry.state = EntryState::Cancelled;
        entry.cancelled_at = Some(now);
        entry.cancel_deadline = Some(now + config.grace_period);
        entry.position = 0;
        let cancelled = entry.clone();

        self.bus.publish(QueueEvent::new(
            queue_id,
            entry_id,
            QueueEventKind::EntryRemoved {
                reason: RemovalReason::Cancelled,
            },
        ));
        recompute_positions(&mut line, queue_id, &self.bus);

        tracing::info!(queue_id, entry_id, "Entry cancelled, grace window open");
        Ok(cancelled)
    }

    // -----------------------------------------------------------------------
    // Merchant-side mutations
    // -----------------------------------------------------------------------

    /// Call an entry to the counter (`waiting -> called`).
    ///
    /// With the queue's `single_called` policy on (the default), fails with
    /// [`CoreError::Conflict`] while another entry is already called.
    pub async fn call(&self, entry_id: DbId) -> CoreResult<QueueEntry> {
        let queue_id = self.queue_id_of(entry_id).await?;
        let config = self.config(queue_id)?;
        let line = self.line(queue_id).await;
        let mut line = line.lock().await;

        if config.single_called {
            if let Some(other) = line.called_entry() {
                if other.id != entry_id {
                    return Err(CoreError::Conflict(format!(
                        "entry {} is already called",
                        other.id
                    )));
                }
            }
        }

        let entry = line
            .entries
            .get_mut(&entry_id)
            .ok_or(CoreError::EntryNotFound(entry_id))?;
        state_machine::validate_transition(entry.state, EntryState::Called)
            .map_err(CoreError::InvalidTransition)?;

        entry.state = EntryState::Called;
        entry.called_at = Some(chrono::Utc::now());
        let called = entry.clone();

        self.bus.publish(QueueEvent::new(
            queue_id,
            entry_id,
            QueueEventKind::EntryCalled {
                verification_code: called.verification_code.clone(),
            },
        ));

        tracing::info!(queue_id, entry_id, "Entry called");
        Ok(called)
    }

    /// Confirm seating (`called -> seated`). Terminal.
    pub async fn seat(&self, entry_id: DbId) -> CoreResult<QueueEntry> {
        let queue_id = self.queue_id_of(entry_id).await?;
        let line = self.line(queue_id).await;
        let mut line = line.lock().await;

        let entry = line
            .entries
            .get_mut(&entry_id)
            .ok_or(CoreError::EntryNotFound(entry_id))?;
        state_machine::validate_transition(entry.state, EntryState::Seated)
            .map_err(CoreError::InvalidTransition)?;

        entry.state = EntryState::Seated;
        entry.seated_at = Some(chrono::Utc::now());
        entry.position = 0;
        let seated = entry.clone();

        self.bus.publish(QueueEvent::new(
            queue_id,
            entry_id,
            QueueEventKind::EntryRemoved {
                reason: RemovalReason::Seated,
            },
        ));
        recompute_positions(&mut line, queue_id, &self.bus);

        tracing::info!(queue_id, entry_id, "Entry seated");
        Ok(seated)
    }

    /// Put an unacknowledged called entry back in line (`called -> waiting`).
    ///
    /// Used by the call-timeout task. Fails with
    /// [`CoreError::InvalidTransition`] if the entry was seated or cancelled
    /// in the meantime, which the caller treats as "nothing to do".
    pub async fn revert_call(&self, entry_id: DbId) -> CoreResult<QueueEntry> {
        let queue_id = self.queue_id_of(entry_id).await?;
        let line = self.line(queue_id).await;
        let mut line = line.lock().await;

        let entry = line
            .entries
            .get_mut(&entry_id)
            .ok_or(CoreError::EntryNotFound(entry_id))?;
        if entry.state != EntryState::Called {
            return Err(CoreError::InvalidTransition(format!(
                "{} -> waiting",
                entry.state
            )));
        }

        entry.state = EntryState::Waiting;
        let reverted = entry.clone();

        // The position itself is unchanged; the event tells the customer's
        // tabs they are back in line rather than called.
        self.bus.publish(QueueEvent::new(
            queue_id,
            entry_id,
            QueueEventKind::PositionChanged {
                position: reverted.position,
            },
        ));

        tracing::info!(queue_id, entry_id, "Call timed out, entry reverted to waiting");
        Ok(reverted)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A copy of the entry, active or retained-terminal.
    pub async fn entry(&self, entry_id: DbId) -> CoreResult<QueueEntry> {
        let queue_id = self.queue_id_of(entry_id).await?;
        let line = self.line(queue_id).await;
        let line = line.lock().await;
        line.entries
            .get(&entry_id)
            .cloned()
            .ok_or(CoreError::EntryNotFound(entry_id))
    }

    /// Customer-facing snapshot with a rough wait estimate.
    pub async fn snapshot(&self, entry_id: DbId) -> CoreResult<EntrySnapshot> {
        let entry = self.entry(entry_id).await?;
        let config = self.config(entry.queue_id)?;
        Ok(snapshot_of(&entry, &config))
    }

    /// Active entries of a queue in position order, for the merchant's line
    /// view.
    pub async fn list_active(&self, queue_id: DbId) -> CoreResult<Vec<QueueEntry>> {
        // Validate the queue exists even if no line was materialized yet.
        self.config(queue_id)?;
        let line = self.line(queue_id).await;
        let line = line.lock().await;

        let mut active: Vec<QueueEntry> = line
            .entries
            .values()
            .filter(|e| e.state.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|e| e.position);
        Ok(active)
    }

    /// Number of active entries in a queue.
    pub async fn active_count(&self, queue_id: DbId) -> usize {
        let line = self.line(queue_id).await;
        let line = line.lock().await;
        line.active_count()
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Drop terminal entries whose retention window has passed.
    ///
    /// Cancelled entries are never dropped before their grace deadline,
    /// whatever the retention setting. Returns the number of archived entries.
    pub async fn archive_expired(&self, now: Timestamp) -> usize {
        let lines: Vec<(DbId, Arc<Mutex<QueueLine>>)> = self
            .lines
            .read()
            .await
            .iter()
            .map(|(id, line)| (*id, Arc::clone(line)))
            .collect();

        let mut archived = 0;
        for (queue_id, line) in lines {
            let retention = match self.directory.get(queue_id) {
                Some(config) => config.retention,
                // Queue vanished from the directory: retain nothing.
                None => std::time::Duration::ZERO,
            };

            let mut line = line.lock().await;
            let expired: Vec<DbId> = line
                .entries
                .values()
                .filter(|e| is_archivable(e, retention, now))
                .map(|e| e.id)
                .collect();

            if expired.is_empty() {
                continue;
            }

            let mut queue_of = self.queue_of.write().await;
            for id in &expired {
                line.entries.remove(id);
                queue_of.remove(id);
            }
            archived += expired.len();
            tracing::debug!(queue_id, count = expired.len(), "Archived terminal entries");
        }
        archived
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn config(&self, queue_id: DbId) -> CoreResult<QueueConfig> {
        self.directory
            .get(queue_id)
            .ok_or(CoreError::QueueNotFound(queue_id))
    }

    async fn queue_id_of(&self, entry_id: DbId) -> CoreResult<DbId> {
        self.queue_of
            .read()
            .await
            .get(&entry_id)
            .copied()
            .ok_or(CoreError::EntryNotFound(entry_id))
    }

    /// The line for a queue, created lazily on first touch.
    async fn line(&self, queue_id: DbId) -> Arc<Mutex<QueueLine>> {
        if let Some(line) = self.lines.read().await.get(&queue_id) {
            return Arc::clone(line);
        }
        let mut lines = self.lines.write().await;
        Arc::clone(lines.entry(queue_id).or_default())
    }

    /// Admission checks shared by `join` and `restore`.
    fn admit(&self, line: &QueueLine, config: &QueueConfig, contact: &str) -> CoreResult<()> {
        if !config.open {
            return Err(CoreError::QueueClosed);
        }
        if let Some(capacity) = config.capacity {
            if line.active_count() >= capacity as usize {
                return Err(CoreError::QueueFull);
            }
        }
        if config.reject_duplicate_contact && line.has_active_contact(contact) {
            return Err(CoreError::DuplicateEntry);
        }
        Ok(())
    }
}

/// Recompute contiguous 1-based positions by ascending order key, publishing
/// a `position-changed` event for every entry whose position moved.
fn recompute_positions(line: &mut QueueLine, queue_id: DbId, bus: &EventBus) {
    let mut active: Vec<(DbId, i64)> = line
        .entries
        .values()
        .filter(|e| e.state.is_active())
        .map(|e| (e.id, e.order_key))
        .collect();
    active.sort_by_key(|(_, order_key)| *order_key);

    for (idx, (id, _)) in active.iter().enumerate() {
        let position = (idx + 1) as u32;
        if let Some(entry) = line.entries.get_mut(id) {
            if entry.position != position {
                entry.position = position;
                bus.publish(QueueEvent::new(
                    queue_id,
                    *id,
                    QueueEventKind::PositionChanged { position },
                ));
            }
        }
    }
}

/// Draw a code that no active entry of the line currently holds.
fn issue_unique_code(line: &QueueLine, len: usize) -> CoreResult<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = verification::issue_code(len);
        if !line.has_active_code(&code) {
            return Ok(code);
        }
    }
    Err(CoreError::Internal(
        "could not issue a unique verification code".to_string(),
    ))
}

/// Build the customer-facing snapshot for an entry.
pub fn snapshot_of(entry: &QueueEntry, config: &QueueConfig) -> EntrySnapshot {
    let ahead = entry.position.saturating_sub(1) as u64;
    let estimated_wait_secs = if entry.state.is_active() {
        ahead * config.avg_service_time.as_secs()
    } else {
        0
    };
    EntrySnapshot {
        queue_id: entry.queue_id,
        entry_id: entry.id,
        state: entry.state,
        position: entry.position,
        verification_code: entry.verification_code.clone(),
        estimated_wait_secs,
    }
}

/// Whether a terminal entry is past both its retention window and (for
/// cancellations) its grace deadline.
fn is_archivable(entry: &QueueEntry, retention: std::time::Duration, now: Timestamp) -> bool {
    let terminal_at = match entry.state {
        EntryState::Seated => entry.seated_at,
        EntryState::Cancelled => entry.cancelled_at,
        EntryState::Waiting | EntryState::Called => return false,
    };
    let Some(terminal_at) = terminal_at else {
        return false;
    };
    if now < terminal_at + retention {
        return false;
    }
    // A cancelled entry must outlive its grace deadline.
    match entry.cancel_deadline {
        Some(deadline) => now > deadline,
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::InMemoryDirectory;

    const QUEUE: DbId = 1;

    fn new_entry(name: &str) -> NewEntry {
        NewEntry {
            display_name: name.to_string(),
            contact: format!("{name}@example.com"),
            party_size: 2,
        }
    }

    fn store_with(config: QueueConfig) -> (Arc<QueueEntryStore>, Arc<EventBus>) {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert(QUEUE, config);
        let bus = Arc::new(EventBus::default());
        let store = Arc::new(QueueEntryStore::new(directory, Arc::clone(&bus), 4));
        (store, bus)
    }

    fn default_store() -> (Arc<QueueEntryStore>, Arc<EventBus>) {
        store_with(QueueConfig::default())
    }

    async fn assert_contiguous(store: &QueueEntryStore, queue_id: DbId) {
        let active = store.list_active(queue_id).await.expect("queue exists");
        let positions: Vec<u32> = active.iter().map(|e| e.position).collect();
        let expected: Vec<u32> = (1..=active.len() as u32).collect();
        assert_eq!(positions, expected, "positions must be contiguous 1..n");
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn join_assigns_sequential_positions() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");
        let c = store.join(QUEUE, new_entry("cai")).await.expect("join c");

        assert_eq!(a.position, 1);
        assert_eq!(b.position, 2);
        assert_eq!(c.position, 3);
        assert_contiguous(&store, QUEUE).await;
    }

    #[tokio::test]
    async fn join_unknown_queue_fails() {
        let (store, _bus) = default_store();

        let err = store.join(99, new_entry("ada")).await.unwrap_err();
        assert!(matches!(err, CoreError::QueueNotFound(99)));
    }

    #[tokio::test]
    async fn join_closed_queue_fails() {
        let (store, _bus) = store_with(QueueConfig {
            open: false,
            ..QueueConfig::default()
        });

        let err = store.join(QUEUE, new_entry("ada")).await.unwrap_err();
        assert!(matches!(err, CoreError::QueueClosed));
    }

    #[tokio::test]
    async fn join_full_queue_fails() {
        let (store, _bus) = store_with(QueueConfig {
            capacity: Some(1),
            ..QueueConfig::default()
        });

        store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let err = store.join(QUEUE, new_entry("bob")).await.unwrap_err();
        assert!(matches!(err, CoreError::QueueFull));
    }

    #[tokio::test]
    async fn join_duplicate_contact_rejected_by_policy() {
        let (store, _bus) = default_store();

        store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let err = store.join(QUEUE, new_entry("ada")).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateEntry));
    }

    #[tokio::test]
    async fn join_duplicate_contact_allowed_when_policy_off() {
        let (store, _bus) = store_with(QueueConfig {
            reject_duplicate_contact: false,
            ..QueueConfig::default()
        });

        store.join(QUEUE, new_entry("ada")).await.expect("join a");
        store.join(QUEUE, new_entry("ada")).await.expect("join dup");
        assert_eq!(store.active_count(QUEUE).await, 2);
    }

    #[tokio::test]
    async fn active_codes_are_unique_and_well_formed() {
        let (store, _bus) = store_with(QueueConfig {
            reject_duplicate_contact: false,
            ..QueueConfig::default()
        });

        let mut codes = std::collections::HashSet::new();
        for i in 0..20 {
            let entry = store
                .join(QUEUE, new_entry(&format!("guest{i}")))
                .await
                .expect("join");
            assert_eq!(entry.verification_code.len(), 4);
            assert!(entry
                .verification_code
                .bytes()
                .all(|b| verification::CODE_ALPHABET.contains(&b)));
            assert!(
                codes.insert(entry.verification_code.clone()),
                "duplicate active code {}",
                entry.verification_code
            );
        }
    }

    // -----------------------------------------------------------------------
    // Call / seat
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn call_then_seat_shifts_positions_up() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");
        let c = store.join(QUEUE, new_entry("cai")).await.expect("join c");

        store.call(a.id).await.expect("call a");
        store.seat(a.id).await.expect("seat a");

        let active = store.list_active(QUEUE).await.expect("list");
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, b.id);
        assert_eq!(active[0].position, 1);
        assert_eq!(active[1].id, c.id);
        assert_eq!(active[1].position, 2);
        assert_contiguous(&store, QUEUE).await;
    }

    #[tokio::test]
    async fn call_emits_event_with_verification_code() {
        let (store, bus) = default_store();
        let mut rx = bus.subscribe();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        // Drain the join's own position event.
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.entry_id, a.id);
        }

        store.call(a.id).await.expect("call a");

        let event = rx.recv().await.expect("should receive call event");
        assert_eq!(event.entry_id, a.id);
        assert!(matches!(
            event.kind,
            QueueEventKind::EntryCalled { ref verification_code }
                if *verification_code == a.verification_code
        ));
    }

    #[tokio::test]
    async fn second_call_conflicts_under_single_called_policy() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");

        store.call(a.id).await.expect("call a");
        let err = store.call(b.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        // Seating the called entry frees the slot.
        store.seat(a.id).await.expect("seat a");
        store.call(b.id).await.expect("call b");
    }

    #[tokio::test]
    async fn concurrent_calls_admit_exactly_one() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");

        let (ra, rb) = tokio::join!(store.call(a.id), store.call(b.id));
        let successes = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1, "exactly one concurrent call may win");
    }

    #[tokio::test]
    async fn seat_requires_called_state() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let err = store.seat(a.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn revert_call_puts_entry_back_in_line() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        store.call(a.id).await.expect("call a");
        let reverted = store.revert_call(a.id).await.expect("revert a");

        assert_eq!(reverted.state, EntryState::Waiting);
        assert_eq!(reverted.position, 1);

        // Reverting a waiting entry is a no-op error.
        let err = store.revert_call(a.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));
    }

    // -----------------------------------------------------------------------
    // Cancel / restore
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn cancel_sets_grace_deadline_and_frees_position() {
        let (store, _bus) = store_with(QueueConfig {
            grace_period: Duration::from_secs(300),
            ..QueueConfig::default()
        });

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");

        let before = chrono::Utc::now();
        let cancelled = store.cancel(a.id).await.expect("cancel a");
        let deadline = cancelled.cancel_deadline.expect("deadline must be set");

        assert_eq!(cancelled.state, EntryState::Cancelled);
        assert!(deadline >= before + Duration::from_secs(299));
        assert!(deadline <= chrono::Utc::now() + Duration::from_secs(301));

        let active = store.list_active(QUEUE).await.expect("list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        assert_eq!(active[0].position, 1);
    }

    #[tokio::test]
    async fn restore_recovers_original_position_and_code() {
        let (store, _bus) = default_store();

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        store.join(QUEUE, new_entry("bob")).await.expect("join b");
        store.join(QUEUE, new_entry("cai")).await.expect("join c");

        let cancelled = store.cancel(a.id).await.expect("cancel a");
        let template = RestoreTemplate {
            queue_id: QUEUE,
            display_name: cancelled.display_name.clone(),
            contact: cancelled.contact.clone(),
            party_size: cancelled.party_size,
            order_key: cancelled.order_key,
            verification_code: cancelled.verification_code.clone(),
        };

        let restored = store.restore(&template).await.expect("restore a");
        assert_ne!(restored.id, a.id, "restore allocates a fresh entry");
        assert_eq!(restored.position, 1, "original position is preserved");
        assert_eq!(restored.verification_code, a.verification_code);
        assert_contiguous(&store, QUEUE).await;
    }

    #[tokio::test]
    async fn restore_respects_capacity() {
        let (store, _bus) = store_with(QueueConfig {
            capacity: Some(2),
            reject_duplicate_contact: false,
            ..QueueConfig::default()
        });

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        store.join(QUEUE, new_entry("bob")).await.expect("join b");
        let cancelled = store.cancel(a.id).await.expect("cancel a");

        // Someone else takes the freed slot.
        store.join(QUEUE, new_entry("cai")).await.expect("join c");

        let template = RestoreTemplate {
            queue_id: QUEUE,
            display_name: cancelled.display_name.clone(),
            contact: cancelled.contact.clone(),
            party_size: cancelled.party_size,
            order_key: cancelled.order_key,
            verification_code: cancelled.verification_code.clone(),
        };
        let err = store.restore(&template).await.unwrap_err();
        assert!(matches!(err, CoreError::QueueFull));
    }

    #[tokio::test]
    async fn interleaved_mutations_keep_positions_contiguous() {
        let (store, _bus) = store_with(QueueConfig {
            reject_duplicate_contact: false,
            single_called: false,
            ..QueueConfig::default()
        });

        let mut ids = Vec::new();
        for i in 0..6 {
            let entry = store
                .join(QUEUE, new_entry(&format!("guest{i}")))
                .await
                .expect("join");
            ids.push(entry.id);
        }

        store.cancel(ids[2]).await.expect("cancel");
        store.call(ids[0]).await.expect("call");
        store.seat(ids[0]).await.expect("seat");
        store.cancel(ids[4]).await.expect("cancel");
        store.call(ids[1]).await.expect("call");

        assert_contiguous(&store, QUEUE).await;
        assert_eq!(store.active_count(QUEUE).await, 3);
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn snapshot_estimates_wait_from_position() {
        let (store, _bus) = store_with(QueueConfig {
            avg_service_time: Duration::from_secs(600),
            ..QueueConfig::default()
        });

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");

        let snap_a = store.snapshot(a.id).await.expect("snapshot a");
        let snap_b = store.snapshot(b.id).await.expect("snapshot b");

        assert_eq!(snap_a.estimated_wait_secs, 0);
        assert_eq!(snap_b.position, 2);
        assert_eq!(snap_b.estimated_wait_secs, 600);
    }

    // -----------------------------------------------------------------------
    // Archival
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn archive_drops_expired_terminal_entries() {
        let (store, _bus) = store_with(QueueConfig {
            retention: Duration::ZERO,
            grace_period: Duration::ZERO,
            ..QueueConfig::default()
        });

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let b = store.join(QUEUE, new_entry("bob")).await.expect("join b");
        store.call(a.id).await.expect("call a");
        store.seat(a.id).await.expect("seat a");
        store.cancel(b.id).await.expect("cancel b");

        let archived = store
            .archive_expired(chrono::Utc::now() + Duration::from_secs(1))
            .await;
        assert_eq!(archived, 2);

        let err = store.entry(a.id).await.unwrap_err();
        assert!(matches!(err, CoreError::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn archive_keeps_cancelled_entries_until_grace_deadline() {
        let (store, _bus) = store_with(QueueConfig {
            retention: Duration::ZERO,
            grace_period: Duration::from_secs(300),
            ..QueueConfig::default()
        });

        let a = store.join(QUEUE, new_entry("ada")).await.expect("join a");
        store.cancel(a.id).await.expect("cancel a");

        // Retention alone has expired, but the grace deadline has not.
        let archived = store.archive_expired(chrono::Utc::now()).await;
        assert_eq!(archived, 0);
        assert!(store.entry(a.id).await.is_ok());
    }

    #[tokio::test]
    async fn active_entries_are_never_archived() {
        let (store, _bus) = store_with(QueueConfig {
            retention: Duration::ZERO,
            ..QueueConfig::default()
        });

        store.join(QUEUE, new_entry("ada")).await.expect("join a");
        let archived = store
            .archive_expired(chrono::Utc::now() + Duration::from_secs(3600))
            .await;
        assert_eq!(archived, 0);
        assert_eq!(store.active_count(QUEUE).await, 1);
    }
}
