//! # Ticketdesk Testing
//!
//! Test doubles and helpers for the ticket lifecycle.
//!
//! This crate provides:
//! - Deterministic clocks
//! - Recording implementations of the capability ports (platform, audit log, transcripts)
//! - A store wrapper that fails on demand
//! - Fixtures for categories, actors and environments
//! - A Given-When-Then harness for lifecycle transitions
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use ticketdesk_testing::{fixtures, RecordingPlatform};
//!
//! #[tokio::test]
//! async fn claim_flow() {
//!     let harness = fixtures::RuntimeHarness::new();
//!     let ticket = harness.open_ticket("t-1", &fixtures::owner(), "support").await.unwrap();
//!     harness.act(&ticket, &fixtures::staff(), LifecycleAction::Claim).await.unwrap();
//!     let titles = harness.platform.context(&ticket.id).unwrap().titles();
//!     assert!(titles.contains(&"claimedEmbed".to_string()));
//! }
//! ```

use chrono::{DateTime, Utc};
use ticketdesk_core::environment::Clock;

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketdesk_testing::mocks::FixedClock;
    /// use ticketdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
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

    /// Clock that tests can move forward.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = time;
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 09:00:00 UTC, a Wednesday)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The instant [`test_clock`] is frozen at.
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T09:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Recording implementations of the capability ports.
pub mod ports;

/// Store wrapper with injectable failures.
pub mod store;

/// Shared fixtures.
pub mod fixtures;

/// Given-When-Then harness for lifecycle transitions.
pub mod transition_test;

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use ticketdesk_core::catalog::Stars;
    use ticketdesk_core::ids::UserProfile;

    /// Any valid star rating.
    pub fn arb_stars() -> impl Strategy<Value = Stars> {
        (1u8..=Stars::MAX).prop_filter_map("in range", Stars::new)
    }

    /// Usernames including the markup characters that must be escaped.
    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z_*~|>`]{1,16}"
    }

    /// A user profile whose tag equals the username.
    pub fn arb_profile() -> impl Strategy<Value = UserProfile> {
        ("[0-9]{4,18}", arb_username())
            .prop_map(|(id, name)| UserProfile::new(id, name.clone(), name))
    }
}

/// Install a tracing subscriber for test output. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::RuntimeHarness;
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use ports::{PlainTemplates, RecordingAuditLog, RecordingPlatform, StubTranscripts};
pub use store::FlakyStore;
pub use transition_test::TransitionTest;
