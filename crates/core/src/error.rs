//! Domain error taxonomy.
//!
//! Customer-facing lookup failures are deliberately uniform: an expired grace
//! binding and a forged token both surface as [`CoreError::SessionNotFound`]
//! with no distinguishing detail, so a caller cannot probe for other
//! customers' entries.

use crate::types::DbId;

/// Domain-level errors raised by the queue engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The queue does not exist in the directory.
    #[error("Queue {0} not found")]
    QueueNotFound(DbId),

    /// The entry does not exist or has been archived.
    #[error("Entry {0} not found")]
    EntryNotFound(DbId),

    /// The session token is unknown, forged, or expired. One message for all
    /// three cases.
    #[error("Not in any queue")]
    SessionNotFound,

    /// The queue is not accepting new entries.
    #[error("Queue is closed")]
    QueueClosed,

    /// The queue has reached its configured capacity.
    #[error("Queue is full")]
    QueueFull,

    /// An active entry already exists for this contact handle.
    #[error("An active entry already exists for this contact")]
    DuplicateEntry,

    /// The requested state transition is not legal.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A competing constraint blocks the operation (e.g. another entry is
    /// already called).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation requires an explicit confirmation step.
    #[error("Explicit confirmation required")]
    ConfirmationRequired,

    /// Missing, invalid, or expired credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias for core results.
pub type CoreResult<T> = Result<T, CoreError>;
