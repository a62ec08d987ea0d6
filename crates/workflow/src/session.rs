//! Session tokens for discarding late async results.
//!
//! Every workflow session (a side panel, an instance list view) draws a
//! token from a [`SessionClock`]. Closing or cancelling the session advances
//! the clock, so a result stamped with an older token is recognizably stale
//! and must not be applied.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifies one workflow session. Tokens only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value produced under a particular session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub token: SessionToken,
    pub value: T,
}

/// Monotonic source of session tokens.
#[derive(Debug, Default)]
pub struct SessionClock {
    current: AtomicU64,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SessionToken {
        SessionToken(self.current.load(Ordering::SeqCst))
    }

    /// Start a new session, invalidating results of every earlier one.
    pub fn advance(&self) -> SessionToken {
        SessionToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        self.current() == token
    }

    pub fn stamp<T>(&self, token: SessionToken, value: T) -> Stamped<T> {
        Stamped { token, value }
    }

    /// Unwrap a result if its session is still open; `None` if stale.
    pub fn accept<T>(&self, stamped: Stamped<T>) -> Option<T> {
        if self.is_current(stamped.token) {
            Some(stamped.value)
        } else {
            tracing::debug!(
                token = %stamped.token,
                current = %self.current(),
                "discarding stale result"
            );
            None
        }
    }
}
