//! Availability calculation.
//!
//! `available = max(0, capacity - sold_count - Σ live hold quantities)`, or unlimited
//! when the ticket type has no capacity. Never stored, always derived at read time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reservation::Reservation;
use crate::types::{Capacity, TicketType, TicketTypeId, TicketTypeStatus};

/// Quantity that can still be reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    /// No capacity configured
    Unlimited,
    /// Units left
    Limited(u32),
}

impl Availability {
    /// Whether `quantity` more units fit.
    #[must_use]
    pub const fn admits(&self, quantity: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(left) => quantity <= *left,
        }
    }

    /// Units left, saturating `Unlimited` to `u32::MAX` (for error reporting).
    #[must_use]
    pub const fn as_count(&self) -> u32 {
        match self {
            Self::Unlimited => u32::MAX,
            Self::Limited(left) => *left,
        }
    }

    /// Nothing left at all.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Limited(0))
    }
}

/// Read model for checkout and catalog display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    /// Ticket type
    pub ticket_type_id: TicketTypeId,
    /// Stored catalog status
    pub status: TicketTypeStatus,
    /// Capacity, `None` for unlimited
    pub capacity: Option<Capacity>,
    /// Confirmed sales
    pub sold: u32,
    /// Units held by live reservations
    pub held: u32,
    /// What can still be reserved
    pub available: Availability,
    /// Frozen after an integrity violation
    pub sales_halted: bool,
    /// When the snapshot was taken
    pub computed_at: DateTime<Utc>,
}

impl AvailabilitySnapshot {
    /// Status badge for display.
    ///
    /// An on-sale ticket type with nothing left shows as sold out, and a halted one as
    /// unavailable. Every other status is shown as stored.
    #[must_use]
    pub const fn badge(&self) -> TicketTypeStatus {
        if self.sales_halted {
            return TicketTypeStatus::Unavailable;
        }
        match self.status {
            TicketTypeStatus::Available if self.available.is_exhausted() => {
                TicketTypeStatus::SoldOut
            }
            status => status,
        }
    }
}

/// Units held by live reservations of `ticket_type_id` at `now`.
///
/// Reservations for other ticket types, terminal reservations and lapsed ones are
/// ignored, so callers may pass an unfiltered slice.
pub fn held_quantity<'a>(
    ticket_type_id: TicketTypeId,
    reservations: impl IntoIterator<Item = &'a Reservation>,
    now: DateTime<Utc>,
) -> u32 {
    reservations
        .into_iter()
        .filter(|r| r.ticket_type_id == ticket_type_id && r.is_live(now))
        .fold(0u32, |acc, r| acc.saturating_add(r.quantity))
}

/// Availability of a ticket type given the units currently held.
#[must_use]
pub fn compute(ticket_type: &TicketType, held: u32) -> Availability {
    match ticket_type.capacity {
        None => Availability::Unlimited,
        Some(capacity) => Availability::Limited(
            capacity
                .value()
                .saturating_sub(ticket_type.sold_count)
                .saturating_sub(held),
        ),
    }
}

/// Full snapshot from a ledger row and its reservations.
pub fn snapshot<'a>(
    ticket_type: &TicketType,
    reservations: impl IntoIterator<Item = &'a Reservation>,
    now: DateTime<Utc>,
) -> AvailabilitySnapshot {
    let held = held_quantity(ticket_type.id, reservations, now);
    snapshot_from_counts(ticket_type, held, now)
}

/// Snapshot when the store already aggregated the held quantity (e.g. `SUM` in SQL).
#[must_use]
pub fn snapshot_from_counts(
    ticket_type: &TicketType,
    held: u32,
    now: DateTime<Utc>,
) -> AvailabilitySnapshot {
    AvailabilitySnapshot {
        ticket_type_id: ticket_type.id,
        status: ticket_type.status,
        capacity: ticket_type.capacity,
        sold: ticket_type.sold_count,
        held,
        available: compute(ticket_type, held),
        sales_halted: ticket_type.sales_halted,
        computed_at: now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EventId, Money, SessionId};
    use chrono::Duration;
    use proptest::prelude::*;

    fn ticket_type(capacity: Option<u32>, sold: u32) -> TicketType {
        let mut tt = TicketType::new(
            EventId::new(),
            "Friday",
            Money::from_cents(5000),
            capacity.map(Capacity::new),
            Utc::now(),
        );
        tt.sold_count = sold;
        tt
    }

    fn hold(tt: &TicketType, quantity: u32, now: DateTime<Utc>, ttl_secs: i64) -> Reservation {
        Reservation::new(
            tt.id,
            quantity,
            SessionId::new("s"),
            now,
            Duration::seconds(ttl_secs),
            serde_json::Value::Null,
        )
        .unwrap()
    }

    #[test]
    fn lapsed_holds_do_not_count() {
        let now = Utc::now();
        let tt = ticket_type(Some(10), 2);
        let live = hold(&tt, 3, now, 300);
        let lapsed = hold(&tt, 4, now - Duration::seconds(600), 300);

        let snap = snapshot(&tt, [&live, &lapsed], now);
        assert_eq!(snap.held, 3);
        assert_eq!(snap.available, Availability::Limited(5));
    }

    #[test]
    fn other_ticket_types_are_ignored() {
        let now = Utc::now();
        let tt = ticket_type(Some(4), 0);
        let other = ticket_type(Some(4), 0);
        let foreign = hold(&other, 4, now, 300);

        assert_eq!(held_quantity(tt.id, [&foreign], now), 0);
    }

    #[test]
    fn unlimited_stays_unlimited() {
        let tt = ticket_type(None, 1_000_000);
        assert_eq!(compute(&tt, 500), Availability::Unlimited);
        assert!(Availability::Unlimited.admits(u32::MAX));
    }

    #[test]
    fn badge_reports_sold_out() {
        let now = Utc::now();
        let tt = ticket_type(Some(2), 2);
        assert_eq!(snapshot(&tt, [], now).badge(), TicketTypeStatus::SoldOut);

        let coming = ticket_type(Some(2), 0).with_status(TicketTypeStatus::ComingSoon);
        assert_eq!(snapshot(&coming, [], now).badge(), TicketTypeStatus::ComingSoon);

        let mut halted = ticket_type(Some(2), 0);
        halted.sales_halted = true;
        assert_eq!(snapshot(&halted, [], now).badge(), TicketTypeStatus::Unavailable);
    }

    proptest! {
        #[test]
        fn never_negative(capacity in 0u32..1000, sold in 0u32..2000, held in 0u32..2000) {
            let tt = ticket_type(Some(capacity), sold);
            match compute(&tt, held) {
                Availability::Limited(left) => {
                    prop_assert!(left <= capacity);
                    prop_assert_eq!(left, capacity.saturating_sub(sold).saturating_sub(held));
                }
                Availability::Unlimited => prop_assert!(false, "capped type reported unlimited"),
            }
        }
    }
}
