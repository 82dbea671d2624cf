//! Reservation manager: checkout holds and their conversion into sales.
//!
//! The manager is the only writer of reservation status. Admission (is there room for
//! this hold?) and fulfilment (hold becomes sale, `sold_count` goes up) each run as one
//! store transaction under the ticket-type lock, so concurrent checkouts can never
//! jointly oversell.

use boxoffice_core::environment::Clock;
use boxoffice_core::{
    FulfillOutcome, InventoryError, InventoryStore, NewReservation, ReleaseOutcome, Reservation,
    ReservationId, Result, SaleId, SessionId, TicketTypeId,
};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::retry::{RetryPolicy, retry_transient};

/// Tunables of the reservation flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationSettings {
    /// Hold duration when the caller does not pass one
    pub default_ttl: Duration,
    /// Largest quantity a single hold may take
    pub max_quantity: u32,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(15 * 60),
            max_quantity: 10,
        }
    }
}

/// Manages checkout holds.
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    settings: ReservationSettings,
}

impl ReservationManager {
    /// Create a manager over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            settings,
        }
    }

    /// Hold `quantity` units of a ticket type for a checkout session.
    ///
    /// `ttl` falls back to [`ReservationSettings::default_ttl`].
    ///
    /// # Errors
    ///
    /// - [`InventoryError::CapacityExceeded`] when the hold does not fit
    /// - [`InventoryError::InvalidQuantity`] outside `1..=max_quantity`
    /// - [`InventoryError::InvalidTtl`] for a zero TTL or one whose expiry overflows
    /// - [`InventoryError::NotOnSale`], [`InventoryError::SalesHalted`],
    ///   [`InventoryError::TicketTypeNotFound`]
    pub async fn reserve(
        &self,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        session_id: SessionId,
        ttl: Option<Duration>,
    ) -> Result<Reservation> {
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| InventoryError::InvalidTtl)?;
        self.reserve_request(NewReservation {
            ticket_type_id,
            quantity,
            session_id,
            ttl,
            metadata: serde_json::Value::Null,
        })
        .await
    }

    /// Same as [`reserve`](Self::reserve) with a fully specified request, including
    /// diagnostic metadata.
    ///
    /// # Errors
    ///
    /// See [`reserve`](Self::reserve).
    #[tracing::instrument(
        skip(self, request),
        fields(
            ticket_type_id = %request.ticket_type_id,
            quantity = request.quantity,
            session_id = %request.session_id,
        )
    )]
    pub async fn reserve_request(&self, request: NewReservation) -> Result<Reservation> {
        if request.quantity > self.settings.max_quantity {
            metrics::record_reservation("rejected");
            return Err(InventoryError::InvalidQuantity(request.quantity));
        }

        let result = retry_transient(&self.retry, "reserve", || {
            self.store.reserve(request.clone(), self.clock.now())
        })
        .await;

        match result {
            Ok(reservation) => {
                metrics::record_reservation("created");
                tracing::debug!(
                    reservation_id = %reservation.id,
                    expires_at = %reservation.expires_at,
                    "Reservation created"
                );
                Ok(reservation)
            }
            Err(error) => {
                metrics::record_reservation("rejected");
                metrics::record_failure("reserve", &error);
                Err(error)
            }
        }
    }

    /// Convert a hold into a sale and confirm it on the ledger, atomically.
    ///
    /// Calling this again for an already fulfilled reservation returns
    /// [`FulfillOutcome::AlreadyFulfilled`] with the original sale and does not touch
    /// the ledger.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Expired`] if the hold lapsed, even before the sweeper ran
    /// - [`InventoryError::InvalidTransition`] if it was released
    /// - [`InventoryError::ReservationNotFound`]
    /// - [`InventoryError::SalesHalted`] / [`InventoryError::InvariantViolation`]
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn fulfill(&self, reservation_id: ReservationId) -> Result<FulfillOutcome> {
        // Minted once so that a retried attempt cannot create a second sale id.
        let sale_id = SaleId::new();

        let outcome = retry_transient(&self.retry, "fulfill", || {
            self.store.fulfill(reservation_id, sale_id, self.clock.now())
        })
        .await
        .inspect_err(|e| metrics::record_failure("fulfill", e))?;

        match &outcome {
            FulfillOutcome::Fulfilled(sale) => {
                metrics::record_reservation("fulfilled");
                metrics::record_tickets_sold(sale.quantity);
                tracing::info!(
                    sale_id = %sale.id,
                    ticket_type_id = %sale.ticket_type_id,
                    quantity = sale.quantity,
                    "Reservation fulfilled"
                );
            }
            FulfillOutcome::AlreadyFulfilled(sale) => {
                tracing::info!(sale_id = %sale.id, "Reservation was already fulfilled");
            }
        }
        Ok(outcome)
    }

    /// Release a hold. Terminal reservations are left as they are.
    ///
    /// # Errors
    ///
    /// [`InventoryError::ReservationNotFound`].
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn release(&self, reservation_id: ReservationId) -> Result<ReleaseOutcome> {
        let outcome = retry_transient(&self.retry, "release", || {
            self.store.release(reservation_id, self.clock.now())
        })
        .await
        .inspect_err(|e| metrics::record_failure("release", e))?;

        match outcome {
            ReleaseOutcome::Released => {
                metrics::record_reservation("released");
                tracing::debug!("Reservation released");
            }
            ReleaseOutcome::AlreadyTerminal(status) => {
                tracing::debug!(%status, "Release ignored, reservation already terminal");
            }
        }
        Ok(outcome)
    }

    /// Release every active hold of a checkout session (abandoned multi-item cart).
    ///
    /// Returns the reservations this call released; calling it again returns an empty
    /// list.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub async fn release_session(&self, session_id: SessionId) -> Result<Vec<ReservationId>> {
        let released = retry_transient(&self.retry, "release_session", || {
            self.store.release_session(session_id.clone(), self.clock.now())
        })
        .await
        .inspect_err(|e| metrics::record_failure("release_session", e))?;

        for _ in &released {
            metrics::record_reservation("released");
        }
        tracing::debug!(count = released.len(), "Session holds released");
        Ok(released)
    }

    /// Look up a reservation as observed now.
    ///
    /// A lapsed hold the sweeper has not reached yet is reported as `expired`.
    ///
    /// # Errors
    ///
    /// [`InventoryError::ReservationNotFound`].
    pub async fn reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        let mut reservation = retry_transient(&self.retry, "reservation", || {
            self.store.reservation(reservation_id)
        })
        .await?;
        reservation.expire(self.clock.now());
        Ok(reservation)
    }
}

impl std::fmt::Debug for ReservationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationManager")
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_core::{ReservationStatus, TicketTypeStatus};
    use boxoffice_testing::{InMemoryInventoryStore, ManualClock, helpers};

    struct Fixture {
        store: InMemoryInventoryStore,
        clock: ManualClock,
        manager: ReservationManager,
    }

    fn fixture() -> Fixture {
        let store = InMemoryInventoryStore::new();
        let clock = ManualClock::default();
        let manager = ReservationManager::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            RetryPolicy::no_retry(),
            ReservationSettings::default(),
        );
        Fixture {
            store,
            clock,
            manager,
        }
    }

    async fn ticket_type(fx: &Fixture, capacity: Option<u32>) -> TicketTypeId {
        fx.store
            .insert_ticket_type(helpers::ticket_type("GA", capacity))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn default_ttl_applies() {
        let fx = fixture();
        let id = ticket_type(&fx, Some(5)).await;
        let hold = fx
            .manager
            .reserve(id, 1, SessionId::new("s"), None)
            .await
            .unwrap();
        assert_eq!(hold.expires_at - hold.reserved_at, chrono::Duration::minutes(15));
    }

    #[tokio::test]
    async fn quantity_above_limit_is_rejected() {
        let fx = fixture();
        let id = ticket_type(&fx, None).await;
        assert_eq!(
            fx.manager.reserve(id, 11, SessionId::new("s"), None).await,
            Err(InventoryError::InvalidQuantity(11))
        );
        assert_eq!(fx.store.reservation_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let fx = fixture();
        let id = ticket_type(&fx, None).await;
        assert_eq!(
            fx.manager
                .reserve(id, 1, SessionId::new("s"), Some(Duration::ZERO))
                .await,
            Err(InventoryError::InvalidTtl)
        );
    }

    #[tokio::test]
    async fn overflowing_ttl_is_rejected_and_store_stays_usable() {
        let fx = fixture();
        let id = ticket_type(&fx, Some(5)).await;
        assert_eq!(
            fx.manager
                .reserve(
                    id,
                    1,
                    SessionId::new("s"),
                    Some(Duration::from_secs(10_000_000_000_000)),
                )
                .await,
            Err(InventoryError::InvalidTtl)
        );
        assert_eq!(fx.store.reservation_count().unwrap(), 0);

        fx.manager
            .reserve(id, 1, SessionId::new("s"), None)
            .await
            .unwrap();
        assert_eq!(fx.store.reservation_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn coming_soon_is_not_on_sale() {
        let fx = fixture();
        let id = ticket_type(&fx, Some(5)).await;
        fx.store
            .set_status(id, TicketTypeStatus::ComingSoon, fx.clock.now())
            .await
            .unwrap();
        assert!(matches!(
            fx.manager.reserve(id, 1, SessionId::new("s"), None).await,
            Err(InventoryError::NotOnSale { .. })
        ));
    }

    #[tokio::test]
    async fn fulfill_after_release_is_invalid() {
        let fx = fixture();
        let id = ticket_type(&fx, Some(5)).await;
        let hold = fx
            .manager
            .reserve(id, 2, SessionId::new("s"), None)
            .await
            .unwrap();
        assert_eq!(
            fx.manager.release(hold.id).await.unwrap(),
            ReleaseOutcome::Released
        );
        assert!(matches!(
            fx.manager.fulfill(hold.id).await,
            Err(InventoryError::InvalidTransition {
                status: ReservationStatus::Released,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn lookup_reports_lazy_expiry() {
        let fx = fixture();
        let id = ticket_type(&fx, Some(5)).await;
        let hold = fx
            .manager
            .reserve(id, 1, SessionId::new("s"), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        fx.clock.advance(chrono::Duration::seconds(61));
        let seen = fx.manager.reservation(hold.id).await.unwrap();
        assert_eq!(seen.status, ReservationStatus::Expired);
        // Reading does not write.
        assert_eq!(
            fx.store.reservation(hold.id).await.unwrap().status,
            ReservationStatus::Active
        );
    }

    #[tokio::test]
    async fn release_session_releases_only_that_session() {
        let fx = fixture();
        let friday = ticket_type(&fx, Some(10)).await;
        let saturday = ticket_type(&fx, Some(10)).await;
        let cart = SessionId::new("cart-1");

        let a = fx.manager.reserve(friday, 2, cart.clone(), None).await.unwrap();
        let b = fx.manager.reserve(saturday, 1, cart.clone(), None).await.unwrap();
        let other = fx
            .manager
            .reserve(friday, 1, SessionId::new("cart-2"), None)
            .await
            .unwrap();

        let mut released = fx.manager.release_session(cart.clone()).await.unwrap();
        released.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(released, expected);
        assert!(fx.manager.release_session(cart).await.unwrap().is_empty());
        assert_eq!(
            fx.manager.reservation(other.id).await.unwrap().status,
            ReservationStatus::Active
        );
    }
}
