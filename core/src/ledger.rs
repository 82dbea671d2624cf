//! Inventory ledger rules.
//!
//! The ledger owns `sold_count`. These functions are the only code that changes it;
//! storage backends call them on a row they hold locked, then write the row back.
//!
//! ```
//! use boxoffice_core::ledger;
//! use boxoffice_core::{Capacity, EventId, Money, TicketType, Utc};
//!
//! let now = Utc::now();
//! let mut ga = TicketType::new(EventId::new(), "GA", Money::from_cents(2500), Some(Capacity::new(1)), now);
//! assert!(ledger::confirm_sale(&mut ga, 1, now).is_ok());
//! assert!(ledger::confirm_sale(&mut ga, 1, now).is_err());
//! assert_eq!(ga.sold_count, 1);
//! ```

use chrono::{DateTime, Utc};

use crate::error::{InventoryError, Result};
use crate::types::TicketType;

/// Reject zero quantities.
///
/// # Errors
///
/// Returns [`InventoryError::InvalidQuantity`] when `quantity == 0`.
pub const fn ensure_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Verify the stored row is sane before any decision is taken on it.
///
/// # Errors
///
/// - [`InventoryError::SalesHalted`] if the ticket type was frozen earlier
/// - [`InventoryError::InvariantViolation`] if `sold_count` exceeds capacity; the caller
///   must persist `sales_halted = true` and surface the error
pub fn ensure_integrity(ticket_type: &TicketType) -> Result<()> {
    if ticket_type.sales_halted {
        return Err(InventoryError::SalesHalted(ticket_type.id));
    }
    if let Some(capacity) = ticket_type.capacity {
        if ticket_type.sold_count > capacity.value() {
            return Err(InventoryError::InvariantViolation {
                ticket_type_id: ticket_type.id,
                sold: ticket_type.sold_count,
                capacity: capacity.value(),
            });
        }
    }
    Ok(())
}

/// Freeze the ticket type if `error` reports a broken invariant.
///
/// Returns whether the row changed and must be written back (in its own commit, so the
/// halt survives the rollback of the failed operation).
pub fn halt_if_violated(
    ticket_type: &mut TicketType,
    error: &InventoryError,
    now: DateTime<Utc>,
) -> bool {
    if !matches!(error, InventoryError::InvariantViolation { .. }) || ticket_type.sales_halted {
        return false;
    }
    ticket_type.sales_halted = true;
    ticket_type.updated_at = now;
    true
}

/// Check-and-increment `sold_count` by `quantity`.
///
/// Uncapped ticket types always succeed (barring counter overflow).
///
/// # Errors
///
/// - [`InventoryError::InvalidQuantity`] for zero or overflowing quantities
/// - [`InventoryError::CapacityExceeded`] when the sale would exceed capacity
/// - any error of [`ensure_integrity`]
pub fn confirm_sale(ticket_type: &mut TicketType, quantity: u32, now: DateTime<Utc>) -> Result<()> {
    ensure_quantity(quantity)?;
    ensure_integrity(ticket_type)?;

    let Some(new_sold) = ticket_type.sold_count.checked_add(quantity) else {
        return Err(InventoryError::InvalidQuantity(quantity));
    };

    if let Some(capacity) = ticket_type.capacity {
        if new_sold > capacity.value() {
            return Err(InventoryError::CapacityExceeded {
                ticket_type_id: ticket_type.id,
                requested: quantity,
                available: capacity.value().saturating_sub(ticket_type.sold_count),
            });
        }
    }

    ticket_type.sold_count = new_sold;
    ticket_type.updated_at = now;
    Ok(())
}

/// Decrement `sold_count` for a refund or cancellation, floored at zero.
///
/// Returns how many units were actually removed. Allowed on halted ticket types since
/// it can only move the counter back towards consistency.
///
/// # Errors
///
/// Returns [`InventoryError::InvalidQuantity`] when `quantity == 0`.
pub fn decrement_sale(ticket_type: &mut TicketType, quantity: u32, now: DateTime<Utc>) -> Result<u32> {
    ensure_quantity(quantity)?;
    let removed = quantity.min(ticket_type.sold_count);
    ticket_type.sold_count -= removed;
    ticket_type.updated_at = now;
    Ok(removed)
}
