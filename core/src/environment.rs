//! Injected dependencies shared by every component.
//!
//! Time is the only ambient dependency of the economy: every window check
//! (`start`, `end`, event date) is evaluated against a single authoritative
//! [`Clock`] at the instant of the call. Callers never supply time.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// Implementations must be monotonically non-decreasing.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
