//! Reservation (checkout hold) state machine.
//!
//! ```text
//!            ┌────────────► fulfilled
//!            │
//!   active ──┼────────────► released
//!            │
//!            └────────────► expired
//! ```
//!
//! `active` is the only non-terminal state. A reservation whose `expires_at` has passed
//! is *logically expired* even while its stored status is still `active`: it no longer
//! counts against availability and cannot be fulfilled. The transition methods apply
//! that rule themselves, so a store persisting their result materialises the expiry
//! as a side effect.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{InventoryError, Result};
use crate::types::{ReservationId, Sale, SaleId, SessionId, TicketType, TicketTypeId};
use crate::{availability, ledger};

/// Stored status of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holding inventory
    Active,
    /// Converted into a sale
    Fulfilled,
    /// Lapsed before payment
    Expired,
    /// Explicitly cancelled by the checkout
    Released,
}

impl ReservationStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Fulfilled => "fulfilled",
            Self::Expired => "expired",
            Self::Released => "released",
        }
    }

    /// Terminal states never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl FromStr for ReservationStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "fulfilled" => Ok(Self::Fulfilled),
            "expired" => Ok(Self::Expired),
            "released" => Ok(Self::Released),
            _ => Err(InventoryError::Storage(format!(
                "Invalid reservation status: {s}"
            ))),
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful `fulfill`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FulfillOutcome {
    /// This call converted the hold into a sale.
    Fulfilled(Sale),
    /// An earlier call already did; this is the original sale.
    AlreadyFulfilled(Sale),
}

impl FulfillOutcome {
    /// The sale, whichever call created it.
    #[must_use]
    pub const fn sale(&self) -> &Sale {
        match self {
            Self::Fulfilled(sale) | Self::AlreadyFulfilled(sale) => sale,
        }
    }

    /// Consume into the sale.
    #[must_use]
    pub fn into_sale(self) -> Sale {
        match self {
            Self::Fulfilled(sale) | Self::AlreadyFulfilled(sale) => sale,
        }
    }

    /// Whether this call incremented the ledger.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }
}

/// Result of `release`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The hold was active and is now released.
    Released,
    /// Nothing to do; the reservation already ended in this state.
    AlreadyTerminal(ReservationStatus),
}

/// Request for a new hold.
#[derive(Clone, Debug, PartialEq)]
pub struct NewReservation {
    /// Ticket type to hold
    pub ticket_type_id: TicketTypeId,
    /// Units to hold
    pub quantity: u32,
    /// Checkout session requesting the hold
    pub session_id: SessionId,
    /// Hold duration
    pub ttl: Duration,
    /// Free-form diagnostics stored with the hold
    pub metadata: serde_json::Value,
}

impl NewReservation {
    /// Admission check, run under the ticket-type lock with `held` computed from the
    /// live reservations at the same instant.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidQuantity`]
    /// - [`InventoryError::InvalidTtl`] for a non-positive TTL or an expiry past the
    ///   representable range
    /// - [`InventoryError::SalesHalted`] / [`InventoryError::InvariantViolation`]
    /// - [`InventoryError::NotOnSale`] when the status is not sellable
    /// - [`InventoryError::CapacityExceeded`] when the hold does not fit
    pub fn admit(&self, ticket_type: &TicketType, held: u32, now: DateTime<Utc>) -> Result<()> {
        ledger::ensure_quantity(self.quantity)?;
        self.expires_at(now)?;
        ledger::ensure_integrity(ticket_type)?;
        if !ticket_type.status.is_sellable() {
            return Err(InventoryError::NotOnSale {
                ticket_type_id: ticket_type.id,
                status: ticket_type.status,
            });
        }
        let available = availability::compute(ticket_type, held);
        if !available.admits(self.quantity) {
            return Err(InventoryError::CapacityExceeded {
                ticket_type_id: ticket_type.id,
                requested: self.quantity,
                available: available.as_count(),
            });
        }
        Ok(())
    }

    /// When a hold granted at `now` lapses.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidTtl`] for a non-positive TTL or on overflow.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.ttl <= Duration::zero() {
            return Err(InventoryError::InvalidTtl);
        }
        now.checked_add_signed(self.ttl).ok_or(InventoryError::InvalidTtl)
    }

    /// Materialise the admitted request as an active reservation.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidTtl`] when the expiry overflows.
    pub fn into_reservation(self, now: DateTime<Utc>) -> Result<Reservation> {
        Reservation::new(
            self.ticket_type_id,
            self.quantity,
            self.session_id,
            now,
            self.ttl,
            self.metadata,
        )
    }
}

/// A time-boxed hold on ticket-type inventory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID
    pub id: ReservationId,
    /// Ticket type held
    pub ticket_type_id: TicketTypeId,
    /// Units held (always > 0)
    pub quantity: u32,
    /// Checkout session that owns the hold
    pub session_id: SessionId,
    /// When the hold was granted
    pub reserved_at: DateTime<Utc>,
    /// When the hold stops counting against availability
    pub expires_at: DateTime<Utc>,
    /// Stored status
    pub status: ReservationStatus,
    /// When it was fulfilled
    pub fulfilled_at: Option<DateTime<Utc>>,
    /// When capacity went back to the pool (release or expiry)
    pub released_at: Option<DateTime<Utc>>,
    /// Sale created by fulfilment
    pub sale_id: Option<SaleId>,
    /// Free-form diagnostics from the checkout
    pub metadata: serde_json::Value,
}

impl Reservation {
    /// Creates an active hold expiring `ttl` after `now`.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidTtl`] when `now + ttl` is not representable.
    pub fn new(
        ticket_type_id: TicketTypeId,
        quantity: u32,
        session_id: SessionId,
        now: DateTime<Utc>,
        ttl: Duration,
        metadata: serde_json::Value,
    ) -> Result<Self> {
        let expires_at = now.checked_add_signed(ttl).ok_or(InventoryError::InvalidTtl)?;
        Ok(Self {
            id: ReservationId::new(),
            ticket_type_id,
            quantity,
            session_id,
            reserved_at: now,
            expires_at,
            status: ReservationStatus::Active,
            fulfilled_at: None,
            released_at: None,
            sale_id: None,
            metadata,
        })
    }

    /// Active and not yet past `expires_at`; only live holds count against availability.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at > now
    }

    /// Stored as active but past its expiry.
    #[must_use]
    pub fn is_logically_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at <= now
    }

    /// Status as observed at `now`, with lazy expiry applied.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> ReservationStatus {
        if self.is_logically_expired(now) {
            ReservationStatus::Expired
        } else {
            self.status
        }
    }

    /// The sale this reservation was converted into, if any.
    #[must_use]
    pub fn sale(&self) -> Option<Sale> {
        match (self.status, self.sale_id, self.fulfilled_at) {
            (ReservationStatus::Fulfilled, Some(id), Some(confirmed_at)) => Some(Sale {
                id,
                reservation_id: self.id,
                ticket_type_id: self.ticket_type_id,
                quantity: self.quantity,
                confirmed_at,
            }),
            _ => None,
        }
    }

    /// Convert the hold into a sale identified by `sale_id`.
    ///
    /// The caller must confirm the sale on the ledger in the same transaction and
    /// discard this change if that fails.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Expired`] if the hold lapsed. A still-`active` lapsed hold is
    ///   moved to `expired` first, so persisting `self` records the expiry.
    /// - [`InventoryError::InvalidTransition`] if the hold was released
    /// - [`InventoryError::Storage`] if a fulfilled row lacks its sale reference
    pub fn fulfill(&mut self, sale_id: SaleId, now: DateTime<Utc>) -> Result<FulfillOutcome> {
        match self.status {
            ReservationStatus::Fulfilled => self.sale().map(FulfillOutcome::AlreadyFulfilled).ok_or_else(|| {
                InventoryError::Storage(format!(
                    "Reservation {} is fulfilled but has no sale reference",
                    self.id
                ))
            }),
            ReservationStatus::Expired => Err(InventoryError::Expired(self.id)),
            ReservationStatus::Released => Err(InventoryError::InvalidTransition {
                reservation_id: self.id,
                status: self.status,
            }),
            ReservationStatus::Active if self.expires_at <= now => {
                self.expire(now);
                Err(InventoryError::Expired(self.id))
            }
            ReservationStatus::Active => {
                self.status = ReservationStatus::Fulfilled;
                self.fulfilled_at = Some(now);
                self.sale_id = Some(sale_id);
                self.sale().map(FulfillOutcome::Fulfilled).ok_or_else(|| {
                    InventoryError::Storage(format!("Reservation {} lost its sale", self.id))
                })
            }
        }
    }

    /// Release an active hold. Terminal holds are left untouched.
    ///
    /// A lapsed but still-`active` hold is recorded as `expired`, not `released`.
    pub fn release(&mut self, now: DateTime<Utc>) -> ReleaseOutcome {
        if self.expire(now) {
            return ReleaseOutcome::AlreadyTerminal(ReservationStatus::Expired);
        }
        if self.status.is_terminal() {
            return ReleaseOutcome::AlreadyTerminal(self.status);
        }
        self.status = ReservationStatus::Released;
        self.released_at = Some(now);
        ReleaseOutcome::Released
    }

    /// Move a lapsed active hold to `expired`. Returns whether anything changed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_logically_expired(now) {
            return false;
        }
        self.status = ReservationStatus::Expired;
        self.released_at = Some(now);
        true
    }
}
