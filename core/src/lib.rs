//! # Boxoffice Core
//!
//! Core types, domain rules and storage traits for the ticket inventory reservation
//! engine.
//!
//! This crate is the functional core of the engine. It knows nothing about databases
//! or async runtimes beyond the storage trait signatures; every decision that protects
//! the inventory (may this hold be granted, may this hold be fulfilled, how many seats
//! are left) is a pure function over the types defined here. Storage backends load
//! rows under a lock, call these functions, and persist the result.
//!
//! ## Core Concepts
//!
//! - **Ticket type**: the unit of inventory, with an optional capacity and a
//!   confirmed `sold_count`
//! - **Reservation**: a time-boxed hold on inventory created at checkout
//! - **Availability**: `capacity - sold - live holds`, computed on every read
//! - **Order sequence**: a per `PREFIX-YEAR` counter minting order numbers
//!
//! ## Invariant
//!
//! For every ticket type with a finite capacity, `sold_count <= capacity` holds at all
//! times. Every mutation path in the storage implementations goes through
//! [`ledger::confirm_sale`] or [`reservation::Reservation::fulfill`], which refuse to
//! break it.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod availability;
pub mod error;
pub mod ledger;
pub mod reservation;
pub mod sequence;
pub mod store;
pub mod types;

pub use availability::{Availability, AvailabilitySnapshot};
pub use error::{InventoryError, Result};
pub use reservation::{FulfillOutcome, ReleaseOutcome, Reservation, ReservationStatus};
pub use sequence::{OrderNumber, SequenceKey, SequenceMode};
pub use store::{InventoryStore, NewReservation, SequenceStore, StoreFuture, SweepBatch};
pub use types::*;

/// Environment module - Dependency injection traits
///
/// All time-dependent decisions in the engine take `now` from a [`Clock`](environment::Clock)
/// so that expiry can be tested deterministically.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use boxoffice_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
