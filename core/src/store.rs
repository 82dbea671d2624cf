//! Storage traits for the ledger, reservations and order sequences.
//!
//! The traits are the transaction boundary of the engine. Every method is one atomic
//! unit of work; implementations serialise all mutations of a given ticket type (or
//! sequence key) and make the decision with the pure rules in [`crate::ledger`],
//! [`crate::reservation`] and [`crate::availability`] while holding that lock.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `boxoffice-postgres`): production, row locks
//! - `InMemoryInventoryStore` / `InMemorySequenceStore` (in `boxoffice-testing`):
//!   fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] instead of using `async fn` so that the runtime
//! components can hold `Arc<dyn InventoryStore>`.
//!
//! # Transient failures
//!
//! Lock timeouts, deadlocks and serialization failures must be reported as
//! [`InventoryError::TransientConflict`] with no side effects, so the runtime can
//! retry the whole call.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

use crate::availability::AvailabilitySnapshot;
use crate::error::Result;
use crate::reservation::{FulfillOutcome, ReleaseOutcome, Reservation};
use crate::sequence::SequenceKey;
use crate::types::{ReservationId, SaleId, SessionId, TicketType, TicketTypeId, TicketTypeStatus};

pub use crate::reservation::NewReservation;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Outcome of one expiry batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepBatch {
    /// Reservations moved from `active` to `expired`
    pub expired: u64,
    /// Units those reservations had been holding
    pub units_released: u64,
}

/// Ledger and reservation storage.
pub trait InventoryStore: Send + Sync {
    /// Insert a ticket type (catalog seeding).
    ///
    /// # Errors
    ///
    /// [`Storage`](crate::InventoryError::Storage) if the id already exists or the row
    /// is invalid.
    fn insert_ticket_type(&self, ticket_type: TicketType) -> StoreFuture<'_, TicketType>;

    /// Load a ticket type.
    ///
    /// # Errors
    ///
    /// [`TicketTypeNotFound`](crate::InventoryError::TicketTypeNotFound) for unknown ids.
    fn ticket_type(&self, id: TicketTypeId) -> StoreFuture<'_, TicketType>;

    /// Change the catalog status.
    ///
    /// # Errors
    ///
    /// [`TicketTypeNotFound`](crate::InventoryError::TicketTypeNotFound) for unknown ids.
    fn set_status(
        &self,
        id: TicketTypeId,
        status: TicketTypeStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType>;

    /// Atomically check `sold_count + quantity <= capacity` and increment.
    ///
    /// # Errors
    ///
    /// See [`crate::ledger::confirm_sale`]; an invariant violation also halts the
    /// ticket type.
    fn confirm_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType>;

    /// Decrement `sold_count`, floored at zero.
    ///
    /// # Errors
    ///
    /// See [`crate::ledger::decrement_sale`].
    fn decrement_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType>;

    /// Read-only availability at `now`.
    ///
    /// # Errors
    ///
    /// [`TicketTypeNotFound`](crate::InventoryError::TicketTypeNotFound) for unknown ids.
    fn availability(
        &self,
        id: TicketTypeId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, AvailabilitySnapshot>;

    /// Admit and insert a hold, atomically with the availability check.
    ///
    /// # Errors
    ///
    /// See [`NewReservation::admit`]; nothing is written on failure.
    fn reserve(&self, request: NewReservation, now: DateTime<Utc>) -> StoreFuture<'_, Reservation>;

    /// Fulfil a hold and confirm the sale on the ledger in one transaction.
    ///
    /// # Errors
    ///
    /// See [`Reservation::fulfill`] and [`crate::ledger::confirm_sale`].
    fn fulfill(
        &self,
        id: ReservationId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, FulfillOutcome>;

    /// Release a hold; no-op on terminal reservations.
    ///
    /// # Errors
    ///
    /// [`ReservationNotFound`](crate::InventoryError::ReservationNotFound).
    fn release(&self, id: ReservationId, now: DateTime<Utc>) -> StoreFuture<'_, ReleaseOutcome>;

    /// Release every active hold of a checkout session, returning the released ids.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn release_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReservationId>>;

    /// Load a reservation as stored.
    ///
    /// # Errors
    ///
    /// [`ReservationNotFound`](crate::InventoryError::ReservationNotFound).
    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Reservation>;

    /// Mark up to `limit` lapsed active holds as expired. Already-terminal rows are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn expire_lapsed(&self, now: DateTime<Utc>, limit: u32) -> StoreFuture<'_, SweepBatch>;

    /// Delete up to `limit` terminal reservations that ended before `older_than`.
    /// Fulfilled ones are only deleted when `include_fulfilled` is set.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn purge_terminal(
        &self,
        older_than: DateTime<Utc>,
        include_fulfilled: bool,
        limit: u32,
    ) -> StoreFuture<'_, u64>;
}

/// Order sequence storage.
pub trait SequenceStore: Send + Sync {
    /// Create the key with `last_number = 0` if it does not exist.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn seed(&self, key: SequenceKey) -> StoreFuture<'_, ()>;

    /// Atomically increment and return the new value, creating the key on first use.
    ///
    /// # Errors
    ///
    /// Storage failures or counter exhaustion.
    fn next_number(&self, key: SequenceKey) -> StoreFuture<'_, u64>;

    /// Last issued number, `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn current(&self, key: SequenceKey) -> StoreFuture<'_, Option<u64>>;
}
