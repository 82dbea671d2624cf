//! In-memory store implementations
//!
//! Fast, deterministic stand-ins for the Postgres store:
//! - [`InMemoryInventoryStore`]: ticket types and reservations behind one mutex
//! - [`InMemorySequenceStore`]: order sequence counters
//!
//! A single lock covers the whole state, so every call is linearizable, which is
//! what the row locks give the Postgres store per ticket type.

use boxoffice_core::availability::{self, AvailabilitySnapshot};
use boxoffice_core::store::{InventoryStore, NewReservation, SequenceStore, StoreFuture, SweepBatch};
use boxoffice_core::{
    FulfillOutcome, InventoryError, ReleaseOutcome, Reservation, ReservationId, ReservationStatus,
    Result, SaleId, SequenceKey, SessionId, TicketType, TicketTypeId, TicketTypeStatus, ledger,
    sequence,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct InventoryState {
    ticket_types: HashMap<TicketTypeId, TicketType>,
    reservations: HashMap<ReservationId, Reservation>,
}

/// Persist a halt caused by `error`, logging it like the production store does.
fn halt_on_violation(ticket_type: &mut TicketType, error: &InventoryError, now: DateTime<Utc>) {
    if ledger::halt_if_violated(ticket_type, error, now) {
        tracing::error!(
            ticket_type_id = %ticket_type.id,
            error = %error,
            "Inventory invariant violated, sales halted"
        );
    }
}

fn poisoned(what: &str) -> InventoryError {
    InventoryError::Storage(format!("In-memory {what} lock poisoned"))
}

/// In-memory ledger and reservation store for fast, deterministic testing.
///
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use boxoffice_core::InventoryStore;
/// use boxoffice_testing::{helpers, InMemoryInventoryStore};
///
/// # async fn example() -> boxoffice_core::Result<()> {
/// let store = InMemoryInventoryStore::new();
/// let vip = store.insert_ticket_type(helpers::ticket_type("VIP", Some(10))).await?;
/// assert_eq!(store.ticket_type(vip.id).await?.sold_count, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<InventoryState>>,
}

impl InMemoryInventoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, InventoryState>> {
        self.state.lock().map_err(|_| poisoned("inventory"))
    }

    /// Number of stored reservations in any status
    ///
    /// # Errors
    ///
    /// Only if the lock is poisoned.
    pub fn reservation_count(&self) -> Result<usize> {
        Ok(self.lock()?.reservations.len())
    }

    /// All stored reservations of a ticket type, as stored (no lazy expiry applied)
    ///
    /// # Errors
    ///
    /// Only if the lock is poisoned.
    pub fn reservations_for(&self, ticket_type_id: TicketTypeId) -> Result<Vec<Reservation>> {
        let state = self.lock()?;
        let mut found: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.ticket_type_id == ticket_type_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.reserved_at);
        Ok(found)
    }

    /// Overwrite `sold_count` without any check, to simulate a corrupted row.
    ///
    /// # Errors
    ///
    /// [`InventoryError::TicketTypeNotFound`] for unknown ids.
    pub fn corrupt_sold_count(&self, id: TicketTypeId, sold_count: u32) -> Result<()> {
        let mut state = self.lock()?;
        let ticket_type = state
            .ticket_types
            .get_mut(&id)
            .ok_or(InventoryError::TicketTypeNotFound(id))?;
        ticket_type.sold_count = sold_count;
        Ok(())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn insert_ticket_type(&self, ticket_type: TicketType) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let mut state = self.lock()?;
            if state.ticket_types.contains_key(&ticket_type.id) {
                return Err(InventoryError::Storage(format!(
                    "Ticket type {} already exists",
                    ticket_type.id
                )));
            }
            // Mirrors the CHECK constraint on the table.
            if let Some(capacity) = ticket_type.capacity {
                if ticket_type.sold_count > capacity.value() {
                    return Err(InventoryError::Storage(format!(
                        "Ticket type {} violates sold_count <= capacity",
                        ticket_type.id
                    )));
                }
            }
            state.ticket_types.insert(ticket_type.id, ticket_type.clone());
            Ok(ticket_type)
        })
    }

    fn ticket_type(&self, id: TicketTypeId) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            self.lock()?
                .ticket_types
                .get(&id)
                .cloned()
                .ok_or(InventoryError::TicketTypeNotFound(id))
        })
    }

    fn set_status(
        &self,
        id: TicketTypeId,
        status: TicketTypeStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let ticket_type = state
                .ticket_types
                .get_mut(&id)
                .ok_or(InventoryError::TicketTypeNotFound(id))?;
            ticket_type.status = status;
            ticket_type.updated_at = now;
            Ok(ticket_type.clone())
        })
    }

    fn confirm_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let ticket_type = state
                .ticket_types
                .get_mut(&id)
                .ok_or(InventoryError::TicketTypeNotFound(id))?;

            let mut next = ticket_type.clone();
            match ledger::confirm_sale(&mut next, quantity, now) {
                Ok(()) => {
                    *ticket_type = next;
                    Ok(ticket_type.clone())
                }
                Err(error) => {
                    halt_on_violation(ticket_type, &error, now);
                    Err(error)
                }
            }
        })
    }

    fn decrement_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let ticket_type = state
                .ticket_types
                .get_mut(&id)
                .ok_or(InventoryError::TicketTypeNotFound(id))?;
            ledger::decrement_sale(ticket_type, quantity, now)?;
            Ok(ticket_type.clone())
        })
    }

    fn availability(
        &self,
        id: TicketTypeId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, AvailabilitySnapshot> {
        Box::pin(async move {
            let state = self.lock()?;
            let ticket_type = state
                .ticket_types
                .get(&id)
                .ok_or(InventoryError::TicketTypeNotFound(id))?;
            Ok(availability::snapshot(
                ticket_type,
                state.reservations.values(),
                now,
            ))
        })
    }

    fn reserve(&self, request: NewReservation, now: DateTime<Utc>) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            let id = request.ticket_type_id;
            let ticket_type = state
                .ticket_types
                .get_mut(&id)
                .ok_or(InventoryError::TicketTypeNotFound(id))?;

            let held = availability::held_quantity(id, state.reservations.values(), now);
            if let Err(error) = request.admit(ticket_type, held, now) {
                halt_on_violation(ticket_type, &error, now);
                return Err(error);
            }

            let reservation = request.into_reservation(now)?;
            state
                .reservations
                .insert(reservation.id, reservation.clone());
            Ok(reservation)
        })
    }

    fn fulfill(
        &self,
        id: ReservationId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, FulfillOutcome> {
        Box::pin(async move {
            let mut guard = self.lock()?;
            let state = &mut *guard;
            let stored = state
                .reservations
                .get_mut(&id)
                .ok_or(InventoryError::ReservationNotFound(id))?;

            let mut next = stored.clone();
            let outcome = match next.fulfill(sale_id, now) {
                Ok(outcome) => outcome,
                Err(error) => {
                    // Persists a lazy expiry, if that is what happened.
                    *stored = next;
                    return Err(error);
                }
            };
            if !outcome.is_new() {
                return Ok(outcome);
            }

            let ticket_type_id = next.ticket_type_id;
            let ticket_type = state
                .ticket_types
                .get_mut(&ticket_type_id)
                .ok_or(InventoryError::TicketTypeNotFound(ticket_type_id))?;
            let mut confirmed = ticket_type.clone();
            if let Err(error) = ledger::confirm_sale(&mut confirmed, next.quantity, now) {
                halt_on_violation(ticket_type, &error, now);
                return Err(error);
            }

            *ticket_type = confirmed;
            *stored = next;
            Ok(outcome)
        })
    }

    fn release(&self, id: ReservationId, now: DateTime<Utc>) -> StoreFuture<'_, ReleaseOutcome> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let reservation = state
                .reservations
                .get_mut(&id)
                .ok_or(InventoryError::ReservationNotFound(id))?;
            Ok(reservation.release(now))
        })
    }

    fn release_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReservationId>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let mut released: Vec<ReservationId> = state
                .reservations
                .values_mut()
                .filter(|r| r.session_id == session_id && r.status == ReservationStatus::Active)
                .filter_map(|r| (r.release(now) == ReleaseOutcome::Released).then_some(r.id))
                .collect();
            released.sort();
            Ok(released)
        })
    }

    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            self.lock()?
                .reservations
                .get(&id)
                .cloned()
                .ok_or(InventoryError::ReservationNotFound(id))
        })
    }

    fn expire_lapsed(&self, now: DateTime<Utc>, limit: u32) -> StoreFuture<'_, SweepBatch> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let mut lapsed: Vec<&mut Reservation> = state
                .reservations
                .values_mut()
                .filter(|r| r.is_logically_expired(now))
                .collect();
            lapsed.sort_by_key(|r| r.expires_at);

            let mut batch = SweepBatch::default();
            for reservation in lapsed.into_iter().take(limit as usize) {
                if reservation.expire(now) {
                    batch.expired += 1;
                    batch.units_released += u64::from(reservation.quantity);
                }
            }
            Ok(batch)
        })
    }

    fn purge_terminal(
        &self,
        older_than: DateTime<Utc>,
        include_fulfilled: bool,
        limit: u32,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let doomed: Vec<ReservationId> = state
                .reservations
                .values()
                .filter(|r| match r.status {
                    ReservationStatus::Active => false,
                    ReservationStatus::Fulfilled => {
                        include_fulfilled && r.fulfilled_at.is_some_and(|at| at < older_than)
                    }
                    ReservationStatus::Expired | ReservationStatus::Released => {
                        r.released_at.unwrap_or(r.expires_at) < older_than
                    }
                })
                .map(|r| r.id)
                .take(limit as usize)
                .collect();

            for id in &doomed {
                state.reservations.remove(id);
            }
            Ok(doomed.len() as u64)
        })
    }
}

/// In-memory order sequence store.
///
/// Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct InMemorySequenceStore {
    counters: Arc<Mutex<HashMap<SequenceKey, u64>>>,
}

impl InMemorySequenceStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SequenceKey, u64>>> {
        self.counters.lock().map_err(|_| poisoned("sequence"))
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn seed(&self, key: SequenceKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.lock()?.entry(key).or_insert(0);
            Ok(())
        })
    }

    fn next_number(&self, key: SequenceKey) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut counters = self.lock()?;
            let last = counters.get(&key).copied().unwrap_or(0);
            let next = sequence::next_after(&key, last)?;
            counters.insert(key, next);
            Ok(next)
        })
    }

    fn current(&self, key: SequenceKey) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move { Ok(self.lock()?.get(&key).copied()) })
    }
}
