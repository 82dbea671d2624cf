//! Domain types for the reservation engine.
//!
//! Identifiers, value objects and the [`TicketType`] / [`Sale`] records. Reservations
//! have their own module because they carry the hold state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::InventoryError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of the event (concert, festival day) a ticket type belongs to
    EventId
);
uuid_id!(
    /// Identifier of a ticket type, the unit of inventory
    TicketTypeId
);
uuid_id!(
    /// Identifier of a reservation (checkout hold)
    ReservationId
);
uuid_id!(
    /// Identifier of a confirmed sale
    SaleId
);

/// Opaque checkout session handle supplied by the checkout flow.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a checkout session handle
    #[must_use]
    pub fn new(session: impl Into<String>) -> Self {
        Self(session.into())
    }

    /// Borrow the raw handle
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money in cents to avoid floating point errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Finite capacity of a ticket type
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(pub u32);

impl Capacity {
    /// Creates a new `Capacity`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the capacity value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ticket Types
// ============================================================================

/// Catalog status of a ticket type.
///
/// Only [`Available`](Self::Available) and [`Test`](Self::Test) ticket types accept new
/// holds. Test ticket types run through exactly the same reservation logic; they are
/// separate rows, so their `sold_count` is naturally reported apart from live stock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketTypeStatus {
    /// On sale
    Available,
    /// Manually marked as sold out by the organiser
    SoldOut,
    /// Announced, sales not open yet
    ComingSoon,
    /// Sales closed
    Closed,
    /// Test ticket type used for checkout rehearsals
    Test,
    /// Withdrawn from sale
    Unavailable,
}

impl TicketTypeStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::SoldOut => "sold_out",
            Self::ComingSoon => "coming_soon",
            Self::Closed => "closed",
            Self::Test => "test",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether new holds may be taken against this status
    #[must_use]
    pub const fn is_sellable(&self) -> bool {
        matches!(self, Self::Available | Self::Test)
    }
}

impl FromStr for TicketTypeStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "sold_out" => Ok(Self::SoldOut),
            "coming_soon" => Ok(Self::ComingSoon),
            "closed" => Ok(Self::Closed),
            "test" => Ok(Self::Test),
            "unavailable" => Ok(Self::Unavailable),
            _ => Err(InventoryError::Storage(format!(
                "Invalid ticket type status: {s}"
            ))),
        }
    }
}

impl fmt::Display for TicketTypeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger row for one ticket type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Ticket type ID
    pub id: TicketTypeId,
    /// Owning event
    pub event_id: EventId,
    /// Display name ("Weekend Pass", "Friday Early Bird")
    pub name: String,
    /// Unit price
    pub price: Money,
    /// Capacity, `None` for unlimited
    pub capacity: Option<Capacity>,
    /// Confirmed sales
    pub sold_count: u32,
    /// Catalog status
    pub status: TicketTypeStatus,
    /// Set when an integrity violation was detected; blocks all further sales
    pub sales_halted: bool,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last mutated
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    /// Creates an on-sale ticket type with nothing sold.
    #[must_use]
    pub fn new(
        event_id: EventId,
        name: impl Into<String>,
        price: Money,
        capacity: Option<Capacity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TicketTypeId::new(),
            event_id,
            name: name.into(),
            price,
            capacity,
            sold_count: 0,
            status: TicketTypeStatus::Available,
            sales_halted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style status override.
    #[must_use]
    pub fn with_status(mut self, status: TicketTypeStatus) -> Self {
        self.status = status;
        self
    }
}

/// A confirmed sale produced by fulfilling a reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Sale ID
    pub id: SaleId,
    /// Reservation that was consumed
    pub reservation_id: ReservationId,
    /// Ticket type sold
    pub ticket_type_id: TicketTypeId,
    /// Number of tickets
    pub quantity: u32,
    /// When the sale was confirmed
    pub confirmed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            TicketTypeStatus::Available,
            TicketTypeStatus::SoldOut,
            TicketTypeStatus::ComingSoon,
            TicketTypeStatus::Closed,
            TicketTypeStatus::Test,
            TicketTypeStatus::Unavailable,
        ] {
            assert_eq!(status.as_str().parse::<TicketTypeStatus>().ok(), Some(status));
        }
        assert!("on_sale".parse::<TicketTypeStatus>().is_err());
    }

    #[test]
    fn only_available_and_test_are_sellable() {
        assert!(TicketTypeStatus::Available.is_sellable());
        assert!(TicketTypeStatus::Test.is_sellable());
        assert!(!TicketTypeStatus::ComingSoon.is_sellable());
        assert!(!TicketTypeStatus::Closed.is_sellable());
        assert!(!TicketTypeStatus::SoldOut.is_sellable());
        assert!(!TicketTypeStatus::Unavailable.is_sellable());
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(4505).to_string(), "45.05");
    }
}
