//! Idle timeout for authenticated dashboard sessions.
//!
//! Unrelated to the queue engine: merchants signed into the dashboard are
//! logged out after a period of inactivity, with a warning window during
//! which an explicit extension resets the timer. Expiry is evaluated against
//! the wall clock on access; a sweep reclaims abandoned records.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// Idle timeout configuration.
#[derive(Debug, Clone, Copy)]
pub struct IdleConfig {
    /// Total inactivity allowance.
    pub duration: Duration,
    /// How long before expiry the countdown warning shows.
    pub warning_window: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(1800),
            warning_window: Duration::from_secs(120),
        }
    }
}

/// Where a session stands relative to its idle deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStatus {
    /// Plenty of time left.
    Active { remaining: Duration },
    /// Inside the warning window; the UI shows a countdown.
    Warning { remaining: Duration },
    /// Past the deadline (or revoked). The session is gone.
    Expired,
}

/// Tracks last-activity timestamps for authenticated dashboard sessions.
///
/// Keyed by the token's unique id (`jti` claim), so a re-login starts a fresh
/// timer.
#[derive(Default)]
pub struct IdleSessionGuard {
    config: IdleConfig,
    last_activity: Mutex<HashMap<String, Timestamp>>,
}

impl IdleSessionGuard {
    pub fn new(config: IdleConfig) -> Self {
        Self {
            config,
            last_activity: Mutex::new(HashMap::new()),
        }
    }

    /// Where the session stands at `now`. Unknown sessions are `Expired`.
    pub fn status(&self, session_id: &str, now: Timestamp) -> IdleStatus {
        let guard = self.last_activity.lock().expect("idle lock poisoned");
        let Some(last) = guard.get(session_id) else {
            return IdleStatus::Expired;
        };
        let deadline = *last + self.config.duration;
        if now >= deadline {
            return IdleStatus::Expired;
        }
        let remaining = (deadline - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if remaining <= self.config.warning_window {
            IdleStatus::Warning { remaining }
        } else {
            IdleStatus::Active { remaining }
        }
    }

    /// Admit a session, starting its timer on first sight.
    ///
    /// Fails once the idle deadline has passed; the expired record is dropped
    /// so the same token cannot be revived.
    pub fn ensure_active(&self, session_id: &str, now: Timestamp) -> CoreResult<()> {
        let mut guard = self.last_activity.lock().expect("idle lock poisoned");
        match guard.get(session_id) {
            None => {
                guard.insert(session_id.to_string(), now);
                Ok(())
            }
            Some(last) if now >= *last + self.config.duration => {
                guard.remove(session_id);
                Err(CoreError::Unauthorized("Session expired".to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Explicit extension: reset the timer to a full allowance.
    ///
    /// Fails for expired or revoked sessions — extending cannot resurrect.
    pub fn extend(&self, session_id: &str, now: Timestamp) -> CoreResult<IdleStatus> {
        let mut guard = self.last_activity.lock().expect("idle lock poisoned");
        match guard.get_mut(session_id) {
            Some(last) if now < *last + self.config.duration => {
                *last = now;
                Ok(IdleStatus::Active {
                    remaining: self.config.duration,
                })
            }
            Some(_) => {
                guard.remove(session_id);
                Err(CoreError::Unauthorized("Session expired".to_string()))
            }
            None => Err(CoreError::Unauthorized("Session expired".to_string())),
        }
    }

    /// Explicit logout. Returns whether the session existed.
    pub fn revoke(&self, session_id: &str) -> bool {
        self.last_activity
            .lock()
            .expect("idle lock poisoned")
            .remove(session_id)
            .is_some()
    }

    /// Drop sessions past their deadline. Returns the number removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut guard = self.last_activity.lock().expect("idle lock poisoned");
        let before = guard.len();
        guard.retain(|_, last| now < *last + self.config.duration);
        before - guard.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
