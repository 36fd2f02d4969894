//! Queue entry model and its state machine.
//!
//! An entry moves `waiting → called → seated`, may revert `called → waiting`
//! on an unacknowledged call timeout, and may be cancelled from either active
//! state. `seated` and `cancelled` are terminal.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// EntryState
// ---------------------------------------------------------------------------

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// In line, not yet called.
    Waiting,
    /// Called to the counter, awaiting acknowledgement.
    Called,
    /// Seated by the merchant. Terminal.
    Seated,
    /// Cancelled by the customer or merchant. Terminal.
    Cancelled,
}

impl EntryState {
    /// Whether the entry still occupies a position in the line.
    pub fn is_active(self) -> bool {
        matches!(self, EntryState::Waiting | EntryState::Called)
    }

    /// Whether the entry has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryState::Seated | EntryState::Cancelled)
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryState::Waiting => "waiting",
            EntryState::Called => "called",
            EntryState::Seated => "seated",
            EntryState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Transition legality for [`EntryState`].
pub mod state_machine {
    use super::EntryState;
    use EntryState::*;

    /// Returns the set of valid target states reachable from `from`.
    ///
    /// Terminal states return an empty slice because no further transitions
    /// are allowed.
    pub fn valid_transitions(from: EntryState) -> &'static [EntryState] {
        match from {
            // Waiting -> Called (merchant calls), Cancelled
            Waiting => &[Called, Cancelled],
            // Called -> Seated (merchant confirms), Waiting (call timeout
            // revert), Cancelled
            Called => &[Seated, Waiting, Cancelled],
            // Terminal states
            Seated | Cancelled => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: EntryState, to: EntryState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: EntryState, to: EntryState) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("{from} -> {to}"))
        }
    }
}

// ---------------------------------------------------------------------------
// QueueEntry
// ---------------------------------------------------------------------------

/// One customer's place in a merchant's waiting line.
///
/// Owned exclusively by the entry store; mutated only through its defined
/// transitions and archived after a terminal state plus the retention window.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    /// Unique entry id.
    pub id: DbId,
    /// Queue the entry belongs to.
    pub queue_id: DbId,
    /// Name shown to staff.
    pub display_name: String,
    /// Contact handle (phone or email), used for duplicate detection.
    pub contact: String,
    /// Number of people in the party.
    pub party_size: u32,
    /// Current lifecycle state.
    pub state: EntryState,
    /// 1-based position among active entries. `0` once terminal.
    pub position: u32,
    /// Code the customer reads back to staff at the counter.
    pub verification_code: String,
    /// Monotonic insertion stamp positions are recomputed from. A grace-period
    /// restore re-uses the original stamp so the entry lands back in its slot.
    pub order_key: i64,
    /// When the entry was created.
    pub created_at: Timestamp,
    /// When the entry was last called, if ever.
    pub called_at: Option<Timestamp>,
    /// When the entry was seated.
    pub seated_at: Option<Timestamp>,
    /// When the entry was cancelled.
    pub cancelled_at: Option<Timestamp>,
    /// Grace-period rejoin deadline, set only on cancellation.
    pub cancel_deadline: Option<Timestamp>,
}

/// Point-in-time view of an entry returned to customers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub queue_id: DbId,
    pub entry_id: DbId,
    pub state: EntryState,
    /// 1-based position among active entries. `0` once terminal.
    pub position: u32,
    pub verification_code: String,
    /// Rough wait estimate derived from the queue's average service time.
    pub estimated_wait_secs: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
