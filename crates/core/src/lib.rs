//! Waitline domain core.
//!
//! Everything that makes the waiting line tick, independent of HTTP:
//!
//! - [`store::QueueEntryStore`] — authoritative state machine and position
//!   ledger for every entry, serialized per queue.
//! - [`recovery::SessionRecoveryRegistry`] — opaque session tokens, reconnect
//!   resolution, and the bounded grace-period rejoin protocol.
//! - [`verification`] — short human-readable codes staff match at the counter.
//! - [`timeout::CallTimeouts`] — cancellable per-entry call-timeout tasks.
//! - [`idle::IdleSessionGuard`] — independent dashboard inactivity timer.

pub mod config;
pub mod entry;
pub mod error;
pub mod idle;
pub mod recovery;
pub mod store;
pub mod timeout;
pub mod types;
pub mod verification;

pub use error::CoreError;
