//! `ReservationEngine`: one handle wiring every component to the same stores.

use boxoffice_core::environment::Clock;
use boxoffice_core::{InventoryStore, SequenceStore};
use std::sync::Arc;

use crate::availability::AvailabilityCalculator;
use crate::ledger::InventoryLedger;
use crate::reservations::{ReservationManager, ReservationSettings};
use crate::retry::RetryPolicy;
use crate::sequence::SequenceAllocator;
use crate::sweeper::{ExpirySweeper, SweeperConfig};

/// Engine-wide settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineConfig {
    /// Reservation flow tunables
    pub reservations: ReservationSettings,
    /// Backoff for transient store conflicts, shared by all components
    pub retry: RetryPolicy,
    /// Expiry sweeper tunables
    pub sweeper: SweeperConfig,
}

/// The reservation engine.
///
/// Cheap to clone; all components share the stores through `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use boxoffice_core::{SessionId, FulfillOutcome};
/// use boxoffice_runtime::{EngineConfig, ReservationEngine};
/// use boxoffice_testing::{helpers, InMemoryInventoryStore, InMemorySequenceStore, ManualClock};
///
/// # async fn example() -> boxoffice_core::Result<()> {
/// let engine = ReservationEngine::new(
///     Arc::new(InMemoryInventoryStore::new()),
///     Arc::new(InMemorySequenceStore::new()),
///     Arc::new(ManualClock::default()),
///     EngineConfig::default(),
/// );
///
/// let ga = engine.ledger().register(helpers::ticket_type("GA", Some(100))).await?;
/// let hold = engine.reservations().reserve(ga.id, 2, SessionId::new("cart-1"), None).await?;
/// let outcome = engine.reservations().fulfill(hold.id).await?;
/// assert!(matches!(outcome, FulfillOutcome::Fulfilled(_)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ReservationEngine {
    ledger: InventoryLedger,
    reservations: ReservationManager,
    availability: AvailabilityCalculator,
    sequences: SequenceAllocator,
    sweeper: ExpirySweeper,
}

impl ReservationEngine {
    /// Wire all components.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        sequences: Arc<dyn SequenceStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let EngineConfig {
            reservations,
            retry,
            sweeper,
        } = config;

        Self {
            ledger: InventoryLedger::new(Arc::clone(&inventory), Arc::clone(&clock), retry.clone()),
            reservations: ReservationManager::new(
                Arc::clone(&inventory),
                Arc::clone(&clock),
                retry.clone(),
                reservations,
            ),
            availability: AvailabilityCalculator::new(
                Arc::clone(&inventory),
                Arc::clone(&clock),
                retry.clone(),
            ),
            sequences: SequenceAllocator::new(sequences, retry.clone()),
            sweeper: ExpirySweeper::new(inventory, clock, retry, sweeper),
        }
    }

    /// Inventory ledger
    #[must_use]
    pub const fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    /// Reservation manager
    #[must_use]
    pub const fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    /// Availability calculator
    #[must_use]
    pub const fn availability(&self) -> &AvailabilityCalculator {
        &self.availability
    }

    /// Sequence allocator
    #[must_use]
    pub const fn sequences(&self) -> &SequenceAllocator {
        &self.sequences
    }

    /// Expiry sweeper; clone it to [`spawn`](ExpirySweeper::spawn) a background task.
    #[must_use]
    pub const fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }
}
