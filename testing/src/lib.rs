//! # Festival Testing
//!
//! Test doubles and helpers for the festival ticket economy.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - An in-memory `EventOracle` with scriptable answers
//! - Small helpers for identities, value amounts and test logging
//!
//! ## Example
//!
//! ```
//! use festival_testing::{ManualClock, test_clock};
//! use festival_core::environment::Clock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_at(test_clock().now());
//! let before = clock.now();
//! clock.advance(Duration::hours(2));
//! assert_eq!(clock.now() - before, Duration::hours(2));
//! ```

use chrono::{DateTime, Utc};
use festival_core::environment::Clock;

/// Mock implementations of environment traits and external collaborators.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use festival_core::oracle::{EventMetadata, EventOracle, OracleError, OracleResult};
    use festival_core::types::{Address, EventId};
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that tests move forward explicitly.
    ///
    /// Clones share the same time, so one handle can be given to the
    /// components under test and another kept to advance it. Time never moves
    /// backwards.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Creates a clock reading `time`
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Moves the clock forward. Negative durations are ignored.
        pub fn advance(&self, by: chrono::Duration) {
            if by > chrono::Duration::zero() {
                *self.time.lock() += by;
            }
        }

        /// Jumps to `time` if it is not in the past of the current reading.
        ///
        /// Returns `false` (and leaves the clock unchanged) otherwise.
        pub fn advance_to(&self, time: DateTime<Utc>) -> bool {
            let mut now = self.time.lock();
            if time < *now {
                return false;
            }
            *now = time;
            true
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock()
        }
    }

    /// In-memory event oracle.
    ///
    /// Knows the events it was given, vouches for the organisers marked as
    /// verified, and can be switched into an unavailable state to exercise
    /// transport failures.
    #[derive(Debug, Default)]
    pub struct MockEventOracle {
        events: Mutex<HashMap<EventId, EventMetadata>>,
        verified: Mutex<HashSet<Address>>,
        unavailable: AtomicBool,
        fetches: AtomicUsize,
    }

    impl MockEventOracle {
        /// Creates an oracle that knows no events
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates an Arc-wrapped instance for sharing
        #[must_use]
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::new())
        }

        /// Registers event metadata and marks its organiser as verified
        pub fn insert_event(&self, event_id: EventId, metadata: EventMetadata) {
            self.verified.lock().insert(metadata.organiser);
            self.events.lock().insert(event_id, metadata);
        }

        /// Sets whether `identity` passes organiser verification
        pub fn set_verified(&self, identity: Address, verified: bool) {
            let mut set = self.verified.lock();
            if verified {
                set.insert(identity);
            } else {
                set.remove(&identity);
            }
        }

        /// Makes every call fail with [`OracleError::Unavailable`]
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Number of `fetch` calls served so far
        #[must_use]
        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn check_available(&self) -> OracleResult<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(OracleError::Unavailable("mock oracle offline".to_string()));
            }
            Ok(())
        }
    }

    impl EventOracle for MockEventOracle {
        fn fetch(
            &self,
            event_id: &EventId,
        ) -> Pin<Box<dyn Future<Output = OracleResult<EventMetadata>> + Send + '_>> {
            let event_id = event_id.clone();
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                self.check_available()?;
                self.events
                    .lock()
                    .get(&event_id)
                    .cloned()
                    .ok_or(OracleError::NotFound(event_id))
            })
        }

        fn verify_organiser(
            &self,
            identity: Address,
        ) -> Pin<Box<dyn Future<Output = OracleResult<bool>> + Send + '_>> {
            Box::pin(async move {
                self.check_available()?;
                Ok(self.verified.lock().contains(&identity))
            })
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use festival_core::types::{Address, Credits, ExchangeRate, NativeValue};

    /// Creates `n` distinct random identities
    #[must_use]
    pub fn accounts(n: usize) -> Vec<Address> {
        (0..n).map(|_| Address::new()).collect()
    }

    /// External value that buys exactly `credits` at `rate`.
    #[must_use]
    pub fn value_for(credits: u64, rate: ExchangeRate) -> NativeValue {
        NativeValue::new(u128::from(credits) * rate.value_per_credit())
    }

    /// Shorthand for a credit amount
    #[must_use]
    pub const fn cr(units: u64) -> Credits {
        Credits::new(units)
    }

    /// Installs a test-friendly tracing subscriber (once per process).
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "festival=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::{accounts, cr, init_test_tracing, value_for};
pub use mocks::{FixedClock, ManualClock, MockEventOracle, test_clock};
