//! Fault injection for retry tests.

use boxoffice_core::availability::AvailabilitySnapshot;
use boxoffice_core::store::{InventoryStore, NewReservation, SequenceStore, StoreFuture, SweepBatch};
use boxoffice_core::{
    FulfillOutcome, InventoryError, ReleaseOutcome, Reservation, ReservationId, Result, SaleId,
    SequenceKey, SessionId, TicketType, TicketTypeId, TicketTypeStatus,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Wraps a store and fails the next `n` calls with
/// [`InventoryError::TransientConflict`] before reaching the inner store.
///
/// Failed calls have no side effects, like a lock timeout in Postgres.
///
/// ```
/// use boxoffice_core::SequenceStore;
/// use boxoffice_core::SequenceKey;
/// use boxoffice_testing::{FlakyStore, InMemorySequenceStore};
///
/// # async fn example() -> boxoffice_core::Result<()> {
/// let store = FlakyStore::new(InMemorySequenceStore::new());
/// store.fail_next(1);
/// let key = SequenceKey::new("ALCBF", 2026)?;
/// assert!(store.next_number(key.clone()).await.is_err());
/// assert_eq!(store.next_number(key).await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    failures_left: AtomicU32,
    calls: AtomicU64,
    injected: AtomicU64,
}

impl<S> FlakyStore<S> {
    /// Wrap `inner` with no failures scheduled
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(0),
            calls: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Fail the next `n` calls
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Total calls seen, including failed ones
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that were failed on purpose
    #[must_use]
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    /// The wrapped store
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn gate(&self, operation: &'static str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            self.injected.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(operation, "Injecting transient conflict");
            return Err(InventoryError::TransientConflict(format!(
                "injected lock timeout in {operation}"
            )));
        }
        Ok(())
    }
}

impl<S: InventoryStore> InventoryStore for FlakyStore<S> {
    fn insert_ticket_type(&self, ticket_type: TicketType) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            self.gate("insert_ticket_type")?;
            self.inner.insert_ticket_type(ticket_type).await
        })
    }

    fn ticket_type(&self, id: TicketTypeId) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            self.gate("ticket_type")?;
            self.inner.ticket_type(id).await
        })
    }

    fn set_status(
        &self,
        id: TicketTypeId,
        status: TicketTypeStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            self.gate("set_status")?;
            self.inner.set_status(id, status, now).await
        })
    }

    fn confirm_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            self.gate("confirm_sale")?;
            self.inner.confirm_sale(id, quantity, now).await
        })
    }

    fn decrement_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            self.gate("decrement_sale")?;
            self.inner.decrement_sale(id, quantity, now).await
        })
    }

    fn availability(
        &self,
        id: TicketTypeId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, AvailabilitySnapshot> {
        Box::pin(async move {
            self.gate("availability")?;
            self.inner.availability(id, now).await
        })
    }

    fn reserve(&self, request: NewReservation, now: DateTime<Utc>) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            self.gate("reserve")?;
            self.inner.reserve(request, now).await
        })
    }

    fn fulfill(
        &self,
        id: ReservationId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, FulfillOutcome> {
        Box::pin(async move {
            self.gate("fulfill")?;
            self.inner.fulfill(id, sale_id, now).await
        })
    }

    fn release(&self, id: ReservationId, now: DateTime<Utc>) -> StoreFuture<'_, ReleaseOutcome> {
        Box::pin(async move {
            self.gate("release")?;
            self.inner.release(id, now).await
        })
    }

    fn release_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReservationId>> {
        Box::pin(async move {
            self.gate("release_session")?;
            self.inner.release_session(session_id, now).await
        })
    }

    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            self.gate("reservation")?;
            self.inner.reservation(id).await
        })
    }

    fn expire_lapsed(&self, now: DateTime<Utc>, limit: u32) -> StoreFuture<'_, SweepBatch> {
        Box::pin(async move {
            self.gate("expire_lapsed")?;
            self.inner.expire_lapsed(now, limit).await
        })
    }

    fn purge_terminal(
        &self,
        older_than: DateTime<Utc>,
        include_fulfilled: bool,
        limit: u32,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.gate("purge_terminal")?;
            self.inner
                .purge_terminal(older_than, include_fulfilled, limit)
                .await
        })
    }
}

impl<S: SequenceStore> SequenceStore for FlakyStore<S> {
    fn seed(&self, key: SequenceKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.gate("seed")?;
            self.inner.seed(key).await
        })
    }

    fn next_number(&self, key: SequenceKey) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.gate("next_number")?;
            self.inner.next_number(key).await
        })
    }

    fn current(&self, key: SequenceKey) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move {
            self.gate("current")?;
            self.inner.current(key).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::InMemoryInventoryStore;
    use crate::helpers;

    #[tokio::test]
    async fn injected_failures_have_no_side_effects() {
        let store = FlakyStore::new(InMemoryInventoryStore::new());
        store.fail_next(2);

        let tt = helpers::ticket_type("GA", Some(1));
        for _ in 0..2 {
            let err = store.insert_ticket_type(tt.clone()).await.unwrap_err();
            assert!(err.is_retryable());
        }
        store.insert_ticket_type(tt.clone()).await.unwrap();

        assert_eq!(store.calls(), 3);
        assert_eq!(store.injected_failures(), 2);
        assert_eq!(store.inner().ticket_type(tt.id).await.unwrap().id, tt.id);
    }
}
