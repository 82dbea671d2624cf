//! # Boxoffice Testing
//!
//! Testing utilities for the reservation engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - In-memory stores ([`InMemoryInventoryStore`], [`InMemorySequenceStore`])
//! - A fault-injecting wrapper ([`FlakyStore`]) for retry tests
//! - Fixture builders and proptest strategies
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::InventoryStore;
//! use boxoffice_testing::{helpers, InMemoryInventoryStore, test_clock};
//! use boxoffice_core::environment::Clock;
//!
//! # async fn example() -> boxoffice_core::Result<()> {
//! let store = InMemoryInventoryStore::new();
//! let ga = store.insert_ticket_type(helpers::ticket_type("GA", Some(2))).await?;
//!
//! let now = test_clock().now();
//! let hold = store.reserve(helpers::hold_request(&ga, 2, "sess-1"), now).await?;
//! assert_eq!(store.availability(ga.id, now).await?.held, hold.quantity);
//! # Ok(())
//! # }
//! ```

use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};

mod faults;
mod memory;

pub use faults::FlakyStore;
pub use memory::{InMemoryInventoryStore, InMemorySequenceStore};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can hand one clone to the engine and
    /// advance another to let holds lapse.
    ///
    /// ```
    /// use boxoffice_testing::mocks::ManualClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::default();
    /// let engine_view = clock.clone();
    /// let before = engine_view.now();
    /// clock.advance(Duration::minutes(15));
    /// assert_eq!(engine_view.now() - before, Duration::minutes(15));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward (or backward for negative durations)
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = to;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_clock().now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2026-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixture builders.
pub mod helpers {
    use super::{Clock, mocks::test_clock};
    use boxoffice_core::{
        Capacity, EventId, Money, NewReservation, SessionId, TicketType, TicketTypeStatus,
    };

    /// An on-sale ticket type priced at 50.00, created at the test epoch.
    #[must_use]
    pub fn ticket_type(name: &str, capacity: Option<u32>) -> TicketType {
        TicketType::new(
            EventId::new(),
            name,
            Money::from_cents(5_000),
            capacity.map(Capacity::new),
            test_clock().now(),
        )
    }

    /// Same as [`ticket_type`] with a different catalog status.
    #[must_use]
    pub fn ticket_type_with_status(
        name: &str,
        capacity: Option<u32>,
        status: TicketTypeStatus,
    ) -> TicketType {
        ticket_type(name, capacity).with_status(status)
    }

    /// A 15 minute hold request.
    #[must_use]
    pub fn hold_request(ticket_type: &TicketType, quantity: u32, session: &str) -> NewReservation {
        NewReservation {
            ticket_type_id: ticket_type.id,
            quantity,
            session_id: SessionId::new(session),
            ttl: chrono::Duration::minutes(15),
            metadata: serde_json::json!({ "source": "test" }),
        }
    }

    /// Install a `tracing` subscriber for test output. Safe to call repeatedly.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One step of a randomised checkout workload.
    ///
    /// Indices refer to previously created holds, modulo how many exist.
    #[derive(Clone, Debug)]
    pub enum CheckoutOp {
        /// Try to hold this many units
        Reserve(u32),
        /// Try to fulfil the n-th hold
        Fulfill(usize),
        /// Release the n-th hold
        Release(usize),
        /// Refund this many units
        Refund(u32),
        /// Let this many seconds pass
        Advance(i64),
        /// Run the expiry sweeper
        Sweep,
    }

    /// Strategy for a single [`CheckoutOp`].
    pub fn checkout_op() -> impl Strategy<Value = CheckoutOp> {
        prop_oneof![
            4 => (1u32..6).prop_map(CheckoutOp::Reserve),
            3 => any::<usize>().prop_map(CheckoutOp::Fulfill),
            2 => any::<usize>().prop_map(CheckoutOp::Release),
            1 => (1u32..4).prop_map(CheckoutOp::Refund),
            2 => (1i64..1_200).prop_map(CheckoutOp::Advance),
            1 => Just(CheckoutOp::Sweep),
        ]
    }

    /// A workload of up to `max_len` operations.
    pub fn checkout_workload(max_len: usize) -> impl Strategy<Value = Vec<CheckoutOp>> {
        proptest::collection::vec(checkout_op(), 0..max_len)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
