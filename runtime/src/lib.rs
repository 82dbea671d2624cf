//! # Boxoffice Runtime
//!
//! The imperative shell of the reservation engine. Each component wraps a store trait
//! object, stamps calls with the injected [`Clock`](boxoffice_core::environment::Clock),
//! retries transient lock conflicts, and records logs and metrics:
//!
//! - [`InventoryLedger`]: confirmed sales per ticket type
//! - [`ReservationManager`]: checkout holds, fulfilment, release
//! - [`AvailabilityCalculator`]: read-only availability for checkout and catalog
//! - [`SequenceAllocator`]: order numbers
//! - [`ExpirySweeper`]: background expiry and retention
//!
//! [`ReservationEngine`] wires all of them to one pair of stores.

pub mod availability;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod reservations;
pub mod retry;
pub mod sequence;
pub mod sweeper;

pub use availability::AvailabilityCalculator;
pub use engine::{EngineConfig, ReservationEngine};
pub use ledger::InventoryLedger;
pub use reservations::{ReservationManager, ReservationSettings};
pub use retry::RetryPolicy;
pub use sequence::SequenceAllocator;
pub use sweeper::{ExpirySweeper, SweepReport, SweeperConfig};
