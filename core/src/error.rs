//! Error taxonomy of the reservation engine.
//!
//! Variants fall in three groups:
//!
//! - **Business outcomes** the checkout shows as ordinary messages
//!   ([`CapacityExceeded`](InventoryError::CapacityExceeded),
//!   [`Expired`](InventoryError::Expired), [`NotOnSale`](InventoryError::NotOnSale))
//! - **Caller / data errors** ([`TicketTypeNotFound`](InventoryError::TicketTypeNotFound),
//!   [`InvalidQuantity`](InventoryError::InvalidQuantity), ...)
//! - **System failures**, of which only
//!   [`TransientConflict`](InventoryError::TransientConflict) is retryable.
//!
//! A fulfilled reservation being fulfilled again is not an error; see
//! [`FulfillOutcome`](crate::reservation::FulfillOutcome).

use crate::reservation::ReservationStatus;
use crate::types::{ReservationId, TicketTypeId, TicketTypeStatus};
use thiserror::Error;

/// Errors returned by the ledger, the reservation manager and the stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Not enough inventory left for the request.
    #[error(
        "Capacity exceeded for ticket type {ticket_type_id}: requested {requested}, available {available}"
    )]
    CapacityExceeded {
        /// Ticket type that is sold out for this request
        ticket_type_id: TicketTypeId,
        /// Requested quantity
        requested: u32,
        /// Quantity that was actually available
        available: u32,
    },

    /// The hold lapsed before it was fulfilled.
    #[error("Reservation {0} has expired")]
    Expired(ReservationId),

    /// The reservation is in a state that does not allow the requested transition.
    #[error("Reservation {reservation_id} cannot transition from {status}")]
    InvalidTransition {
        /// Reservation ID
        reservation_id: ReservationId,
        /// Its current status
        status: ReservationStatus,
    },

    /// Unknown ticket type.
    #[error("Ticket type not found: {0}")]
    TicketTypeNotFound(TicketTypeId),

    /// Unknown reservation.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The ticket type does not accept new holds in its current status.
    #[error("Ticket type {ticket_type_id} is not on sale (status {status})")]
    NotOnSale {
        /// Ticket type ID
        ticket_type_id: TicketTypeId,
        /// Current catalog status
        status: TicketTypeStatus,
    },

    /// Quantity outside the accepted range.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// Hold duration must be positive.
    #[error("Reservation TTL must be positive")]
    InvalidTtl,

    /// Sales were frozen after an integrity violation.
    #[error("Sales for ticket type {0} are halted pending investigation")]
    SalesHalted(TicketTypeId),

    /// `sold_count` was found above capacity. Never tolerated.
    #[error(
        "Inventory invariant violated for ticket type {ticket_type_id}: sold {sold} exceeds capacity {capacity}"
    )]
    InvariantViolation {
        /// Ticket type ID
        ticket_type_id: TicketTypeId,
        /// Stored sold count
        sold: u32,
        /// Configured capacity
        capacity: u32,
    },

    /// Lock or serialization conflict in the store. Safe to retry.
    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    /// Any other storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl InventoryError {
    /// Whether the operation may succeed if simply attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConflict(_))
    }

    /// Whether this is an expected checkout outcome rather than a failure.
    ///
    /// Business outcomes are logged below `warn` and never counted as errors.
    #[must_use]
    pub const fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::Expired(_) | Self::NotOnSale { .. }
        )
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_conflicts_are_retryable() {
        assert!(InventoryError::TransientConflict("deadlock".into()).is_retryable());
        assert!(!InventoryError::Storage("boom".into()).is_retryable());
        assert!(!InventoryError::Expired(ReservationId::new()).is_retryable());
    }

    #[test]
    fn capacity_and_expiry_are_business_outcomes() {
        let sold_out = InventoryError::CapacityExceeded {
            ticket_type_id: TicketTypeId::new(),
            requested: 2,
            available: 1,
        };
        assert!(sold_out.is_business_outcome());
        assert!(InventoryError::Expired(ReservationId::new()).is_business_outcome());
        assert!(!InventoryError::SalesHalted(TicketTypeId::new()).is_business_outcome());
    }
}
