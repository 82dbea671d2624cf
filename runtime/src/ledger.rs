//! Inventory ledger: the sole owner of `sold_count` and `capacity`.

use boxoffice_core::environment::Clock;
use boxoffice_core::{InventoryStore, Result, TicketType, TicketTypeId, TicketTypeStatus};
use std::sync::Arc;

use crate::metrics;
use crate::retry::{RetryPolicy, retry_transient};

/// Authoritative per-ticket-type sold counter.
///
/// Every method is linearizable per ticket type: the store serialises them on the
/// ticket-type row. Transient lock conflicts are retried according to the
/// [`RetryPolicy`].
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl InventoryLedger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// Add a ticket type from the catalog.
    ///
    /// # Errors
    ///
    /// [`Storage`](boxoffice_core::InventoryError::Storage) if it already exists or is
    /// inconsistent.
    #[tracing::instrument(skip(self, ticket_type), fields(ticket_type_id = %ticket_type.id, name = %ticket_type.name))]
    pub async fn register(&self, ticket_type: TicketType) -> Result<TicketType> {
        let registered = retry_transient(&self.retry, "register", || {
            self.store.insert_ticket_type(ticket_type.clone())
        })
        .await
        .inspect_err(|e| metrics::record_failure("register", e))?;

        tracing::info!(
            capacity = ?registered.capacity.map(|c| c.value()),
            status = %registered.status,
            "Ticket type registered"
        );
        Ok(registered)
    }

    /// Current ledger row.
    ///
    /// # Errors
    ///
    /// [`TicketTypeNotFound`](boxoffice_core::InventoryError::TicketTypeNotFound).
    pub async fn ticket_type(&self, id: TicketTypeId) -> Result<TicketType> {
        retry_transient(&self.retry, "ticket_type", || self.store.ticket_type(id)).await
    }

    /// Change the catalog status of a ticket type.
    ///
    /// # Errors
    ///
    /// [`TicketTypeNotFound`](boxoffice_core::InventoryError::TicketTypeNotFound).
    #[tracing::instrument(skip(self), fields(ticket_type_id = %id, status = %status))]
    pub async fn set_status(&self, id: TicketTypeId, status: TicketTypeStatus) -> Result<TicketType> {
        let updated = retry_transient(&self.retry, "set_status", || {
            self.store.set_status(id, status, self.clock.now())
        })
        .await
        .inspect_err(|e| metrics::record_failure("set_status", e))?;

        tracing::info!("Ticket type status changed");
        Ok(updated)
    }

    /// Atomically check `sold_count + quantity <= capacity` and increment.
    ///
    /// Used for sales that bypass the reservation flow (box office, comps). Checkout
    /// sales go through [`ReservationManager::fulfill`](crate::ReservationManager::fulfill),
    /// which confirms on the ledger in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`CapacityExceeded`](boxoffice_core::InventoryError::CapacityExceeded)
    /// - [`InvalidQuantity`](boxoffice_core::InventoryError::InvalidQuantity)
    /// - [`SalesHalted`](boxoffice_core::InventoryError::SalesHalted) /
    ///   [`InvariantViolation`](boxoffice_core::InventoryError::InvariantViolation)
    /// - [`TransientConflict`](boxoffice_core::InventoryError::TransientConflict) once
    ///   retries are exhausted
    #[tracing::instrument(skip(self), fields(ticket_type_id = %id))]
    pub async fn try_confirm_sale(&self, id: TicketTypeId, quantity: u32) -> Result<TicketType> {
        let updated = retry_transient(&self.retry, "confirm_sale", || {
            self.store.confirm_sale(id, quantity, self.clock.now())
        })
        .await
        .inspect_err(|e| metrics::record_failure("confirm_sale", e))?;

        metrics::record_tickets_sold(quantity);
        tracing::debug!(sold_count = updated.sold_count, "Sale confirmed");
        Ok(updated)
    }

    /// Give units back after a refund or cancellation, floored at zero.
    ///
    /// # Errors
    ///
    /// [`InvalidQuantity`](boxoffice_core::InventoryError::InvalidQuantity) for zero,
    /// [`TicketTypeNotFound`](boxoffice_core::InventoryError::TicketTypeNotFound).
    #[tracing::instrument(skip(self), fields(ticket_type_id = %id))]
    pub async fn decrement_sale(&self, id: TicketTypeId, quantity: u32) -> Result<TicketType> {
        let updated = retry_transient(&self.retry, "decrement_sale", || {
            self.store.decrement_sale(id, quantity, self.clock.now())
        })
        .await
        .inspect_err(|e| metrics::record_failure("decrement_sale", e))?;

        metrics::record_tickets_refunded(quantity);
        tracing::info!(sold_count = updated.sold_count, "Sale decremented");
        Ok(updated)
    }
}

impl std::fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLedger")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
