//! Availability calculator: the read path used by checkout and catalog pages.

use boxoffice_core::environment::Clock;
use boxoffice_core::{AvailabilitySnapshot, InventoryStore, Result, TicketTypeId};
use futures::future::try_join_all;
use std::sync::Arc;

use crate::retry::{RetryPolicy, retry_transient};

/// Computes how many units can still be reserved.
///
/// Nothing is cached or stored; every call derives the figure from the ledger row and
/// the live holds at the current instant. Lapsed holds never count, whether or not the
/// sweeper has processed them.
#[derive(Clone)]
pub struct AvailabilityCalculator {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl AvailabilityCalculator {
    /// Create a calculator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// Availability of one ticket type.
    ///
    /// # Errors
    ///
    /// [`TicketTypeNotFound`](boxoffice_core::InventoryError::TicketTypeNotFound).
    pub async fn available(&self, ticket_type_id: TicketTypeId) -> Result<AvailabilitySnapshot> {
        let snapshot = retry_transient(&self.retry, "availability", || {
            self.store.availability(ticket_type_id, self.clock.now())
        })
        .await?;

        tracing::trace!(
            %ticket_type_id,
            available = ?snapshot.available,
            held = snapshot.held,
            "Availability computed"
        );
        Ok(snapshot)
    }

    /// Availability of several ticket types, in the order given, all evaluated at the
    /// same instant.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any id is unknown.
    pub async fn available_many(&self, ids: &[TicketTypeId]) -> Result<Vec<AvailabilitySnapshot>> {
        let now = self.clock.now();
        try_join_all(ids.iter().map(|&id| {
            retry_transient(&self.retry, "availability", move || {
                self.store.availability(id, now)
            })
        }))
        .await
    }
}

impl std::fmt::Debug for AvailabilityCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityCalculator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::{Availability, InventoryError, TicketTypeStatus};
    use boxoffice_testing::{InMemoryInventoryStore, ManualClock, helpers};

    #[tokio::test]
    async fn catalog_page_keeps_order() {
        let store = InMemoryInventoryStore::new();
        let calculator = AvailabilityCalculator::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::default()),
            RetryPolicy::no_retry(),
        );

        let capped = store
            .insert_ticket_type(helpers::ticket_type("VIP", Some(0)))
            .await
            .unwrap();
        let open = store
            .insert_ticket_type(helpers::ticket_type("Lawn", None))
            .await
            .unwrap();

        let page = calculator.available_many(&[open.id, capped.id]).await.unwrap();
        assert_eq!(page[0].available, Availability::Unlimited);
        assert_eq!(page[1].available, Availability::Limited(0));
        assert_eq!(page[1].badge(), TicketTypeStatus::SoldOut);

        let missing = TicketTypeId::new();
        assert_eq!(
            calculator.available_many(&[open.id, missing]).await,
            Err(InventoryError::TicketTypeNotFound(missing))
        );
    }
}
