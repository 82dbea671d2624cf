//! [`InventoryStore`] on `ticket_types` and `reservations`.

use boxoffice_core::{
    AvailabilitySnapshot, FulfillOutcome, InventoryError, InventoryStore, NewReservation,
    ReleaseOutcome, Reservation, ReservationId, Result, SaleId, SessionId, StoreFuture,
    SweepBatch, TicketType, TicketTypeId, TicketTypeStatus, availability, ledger,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{Postgres, Row, Transaction};

use crate::rows::{
    RESERVATION_COLUMNS, TICKET_TYPE_COLUMNS, count_to_db, counter_from_db, counter_to_db,
    row_to_reservation, row_to_ticket_type,
};
use crate::{PostgresStore, commit, db_error};

// ============================================================================
// Statement helpers (run inside the caller's transaction)
// ============================================================================

async fn lock_ticket_type(conn: &mut PgConnection, id: TicketTypeId) -> Result<TicketType> {
    let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("lock ticket type", e))?
        .ok_or(InventoryError::TicketTypeNotFound(id))?;
    row_to_ticket_type(&row)
}

async fn write_ticket_type(conn: &mut PgConnection, ticket_type: &TicketType) -> Result<()> {
    sqlx::query(
        "UPDATE ticket_types
         SET sold_count = $2, status = $3, sales_halted = $4, updated_at = $5
         WHERE id = $1",
    )
    .bind(*ticket_type.id.as_uuid())
    .bind(count_to_db("sold_count", ticket_type.sold_count)?)
    .bind(ticket_type.status.as_str())
    .bind(ticket_type.sales_halted)
    .bind(ticket_type.updated_at)
    .execute(conn)
    .await
    .map_err(|e| db_error("update ticket type", e))?;
    Ok(())
}

/// Units held by live reservations. Callers hold the ticket-type lock, so no new hold
/// can appear for this ticket type until they commit.
async fn held_quantity(
    conn: &mut PgConnection,
    ticket_type_id: TicketTypeId,
    now: DateTime<Utc>,
) -> Result<u32> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(quantity), 0)::BIGINT AS held
         FROM reservations
         WHERE ticket_type_id = $1 AND status = 'active' AND expires_at > $2",
    )
    .bind(*ticket_type_id.as_uuid())
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| db_error("sum held quantity", e))?;

    let held: i64 = row.get("held");
    Ok(u32::try_from(held.max(0)).unwrap_or(u32::MAX))
}

async fn reservation_ticket_type(
    conn: &mut PgConnection,
    id: ReservationId,
) -> Result<TicketTypeId> {
    let row = sqlx::query("SELECT ticket_type_id FROM reservations WHERE id = $1")
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("load reservation", e))?
        .ok_or(InventoryError::ReservationNotFound(id))?;
    Ok(TicketTypeId::from_uuid(row.get("ticket_type_id")))
}

async fn lock_reservation(conn: &mut PgConnection, id: ReservationId) -> Result<Reservation> {
    let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("lock reservation", e))?
        .ok_or(InventoryError::ReservationNotFound(id))?;
    row_to_reservation(&row)
}

async fn insert_reservation(conn: &mut PgConnection, reservation: &Reservation) -> Result<()> {
    sqlx::query(
        "INSERT INTO reservations
            (id, ticket_type_id, quantity, session_id, reserved_at, expires_at, status, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(*reservation.id.as_uuid())
    .bind(*reservation.ticket_type_id.as_uuid())
    .bind(count_to_db("quantity", reservation.quantity)?)
    .bind(reservation.session_id.as_str())
    .bind(reservation.reserved_at)
    .bind(reservation.expires_at)
    .bind(reservation.status.as_str())
    .bind(&reservation.metadata)
    .execute(conn)
    .await
    .map_err(|e| db_error("insert reservation", e))?;
    Ok(())
}

async fn write_reservation(conn: &mut PgConnection, reservation: &Reservation) -> Result<()> {
    sqlx::query(
        "UPDATE reservations
         SET status = $2, fulfilled_at = $3, released_at = $4, sale_id = $5
         WHERE id = $1",
    )
    .bind(*reservation.id.as_uuid())
    .bind(reservation.status.as_str())
    .bind(reservation.fulfilled_at)
    .bind(reservation.released_at)
    .bind(reservation.sale_id.map(|id| *id.as_uuid()))
    .execute(conn)
    .await
    .map_err(|e| db_error("update reservation", e))?;
    Ok(())
}

/// Persist `sales_halted` if `error` is an invariant violation, discarding every other
/// change of the transaction. Otherwise the transaction is rolled back on drop.
async fn halt_on_violation(
    mut tx: Transaction<'static, Postgres>,
    ticket_type: &mut TicketType,
    error: &InventoryError,
    now: DateTime<Utc>,
) -> Result<()> {
    if !ledger::halt_if_violated(ticket_type, error, now) {
        return Ok(());
    }
    tracing::error!(
        ticket_type_id = %ticket_type.id,
        error = %error,
        "Inventory invariant violated, halting sales"
    );
    write_ticket_type(&mut tx, ticket_type).await?;
    commit(tx).await
}

// ============================================================================
// InventoryStore
// ============================================================================

impl InventoryStore for PostgresStore {
    fn insert_ticket_type(&self, ticket_type: TicketType) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO ticket_types
                    (id, event_id, name, price_cents, capacity, sold_count, status,
                     sales_halted, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 RETURNING {TICKET_TYPE_COLUMNS}"
            );
            let capacity = ticket_type
                .capacity
                .map(|c| count_to_db("capacity", c.value()))
                .transpose()?;

            let row = sqlx::query(&sql)
                .bind(*ticket_type.id.as_uuid())
                .bind(*ticket_type.event_id.as_uuid())
                .bind(&ticket_type.name)
                .bind(counter_to_db("price_cents", ticket_type.price.cents())?)
                .bind(capacity)
                .bind(count_to_db("sold_count", ticket_type.sold_count)?)
                .bind(ticket_type.status.as_str())
                .bind(ticket_type.sales_halted)
                .bind(ticket_type.created_at)
                .bind(ticket_type.updated_at)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("insert ticket type", e))?;
            row_to_ticket_type(&row)
        })
    }

    fn ticket_type(&self, id: TicketTypeId) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("load ticket type", e))?
                .ok_or(InventoryError::TicketTypeNotFound(id))?;
            row_to_ticket_type(&row)
        })
    }

    fn set_status(
        &self,
        id: TicketTypeId,
        status: TicketTypeStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE ticket_types SET status = $2, updated_at = $3 WHERE id = $1
                 RETURNING {TICKET_TYPE_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(*id.as_uuid())
                .bind(status.as_str())
                .bind(now)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("update ticket type status", e))?
                .ok_or(InventoryError::TicketTypeNotFound(id))?;
            row_to_ticket_type(&row)
        })
    }

    fn confirm_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            let mut ticket_type = lock_ticket_type(&mut tx, id).await?;

            if let Err(error) = ledger::confirm_sale(&mut ticket_type, quantity, now) {
                halt_on_violation(tx, &mut ticket_type, &error, now).await?;
                return Err(error);
            }

            write_ticket_type(&mut tx, &ticket_type).await?;
            commit(tx).await?;
            Ok(ticket_type)
        })
    }

    fn decrement_sale(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TicketType> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            let mut ticket_type = lock_ticket_type(&mut tx, id).await?;
            ledger::decrement_sale(&mut ticket_type, quantity, now)?;
            write_ticket_type(&mut tx, &ticket_type).await?;
            commit(tx).await?;
            Ok(ticket_type)
        })
    }

    fn availability(
        &self,
        id: TicketTypeId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, AvailabilitySnapshot> {
        Box::pin(async move {
            // One statement, so the row and the held sum come from the same snapshot.
            let sql = format!(
                "SELECT {TICKET_TYPE_COLUMNS},
                    (SELECT COALESCE(SUM(r.quantity), 0)::BIGINT
                     FROM reservations r
                     WHERE r.ticket_type_id = ticket_types.id
                       AND r.status = 'active' AND r.expires_at > $2) AS held
                 FROM ticket_types WHERE id = $1"
            );
            let row = sqlx::query(&sql)
                .bind(*id.as_uuid())
                .bind(now)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("read availability", e))?
                .ok_or(InventoryError::TicketTypeNotFound(id))?;

            let ticket_type = row_to_ticket_type(&row)?;
            let held: i64 = row.get("held");
            let held = u32::try_from(held.max(0)).unwrap_or(u32::MAX);
            Ok(availability::snapshot_from_counts(&ticket_type, held, now))
        })
    }

    fn reserve(&self, request: NewReservation, now: DateTime<Utc>) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            let mut ticket_type = lock_ticket_type(&mut tx, request.ticket_type_id).await?;
            let held = held_quantity(&mut tx, ticket_type.id, now).await?;

            if let Err(error) = request.admit(&ticket_type, held, now) {
                halt_on_violation(tx, &mut ticket_type, &error, now).await?;
                return Err(error);
            }

            let reservation = request.into_reservation(now)?;
            insert_reservation(&mut tx, &reservation).await?;
            commit(tx).await?;

            tracing::debug!(
                reservation_id = %reservation.id,
                ticket_type_id = %reservation.ticket_type_id,
                quantity = reservation.quantity,
                held_before = held,
                "Hold inserted"
            );
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
            let mut tx = self.begin().await?;
            // Ticket type first, reservation second: the same order as `reserve`.
            let ticket_type_id = reservation_ticket_type(&mut tx, id).await?;
            let mut ticket_type = lock_ticket_type(&mut tx, ticket_type_id).await?;
            let mut reservation = lock_reservation(&mut tx, id).await?;
            let stored = reservation.clone();

            let outcome = match reservation.fulfill(sale_id, now) {
                Ok(outcome) => outcome,
                Err(error) => {
                    // A lapsed hold was moved to `expired`; keep that.
                    if reservation != stored {
                        write_reservation(&mut tx, &reservation).await?;
                        commit(tx).await?;
                    }
                    return Err(error);
                }
            };
            if !outcome.is_new() {
                return Ok(outcome);
            }

            if let Err(error) = ledger::confirm_sale(&mut ticket_type, reservation.quantity, now) {
                halt_on_violation(tx, &mut ticket_type, &error, now).await?;
                return Err(error);
            }

            write_ticket_type(&mut tx, &ticket_type).await?;
            write_reservation(&mut tx, &reservation).await?;
            commit(tx).await?;
            Ok(outcome)
        })
    }

    fn release(&self, id: ReservationId, now: DateTime<Utc>) -> StoreFuture<'_, ReleaseOutcome> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            let mut reservation = lock_reservation(&mut tx, id).await?;
            let stored = reservation.clone();

            let outcome = reservation.release(now);
            if reservation != stored {
                write_reservation(&mut tx, &reservation).await?;
                commit(tx).await?;
            }
            Ok(outcome)
        })
    }

    fn release_session(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<ReservationId>> {
        Box::pin(async move {
            let mut tx = self.begin().await?;
            let sql = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations
                 WHERE session_id = $1 AND status = 'active'
                 ORDER BY id
                 FOR UPDATE"
            );
            let rows = sqlx::query(&sql)
                .bind(session_id.as_str())
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| db_error("lock session reservations", e))?;

            let mut released = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut reservation = row_to_reservation(row)?;
                let outcome = reservation.release(now);
                write_reservation(&mut tx, &reservation).await?;
                if outcome == ReleaseOutcome::Released {
                    released.push(reservation.id);
                }
            }
            commit(tx).await?;

            released.sort();
            Ok(released)
        })
    }

    fn reservation(&self, id: ReservationId) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("load reservation", e))?
                .ok_or(InventoryError::ReservationNotFound(id))?;
            row_to_reservation(&row)
        })
    }

    fn expire_lapsed(&self, now: DateTime<Utc>, limit: u32) -> StoreFuture<'_, SweepBatch> {
        Box::pin(async move {
            // SKIP LOCKED: holds being fulfilled or released right now are left to
            // their owner (or the next pass).
            let quantities = sqlx::query(
                "WITH lapsed AS (
                    SELECT id FROM reservations
                    WHERE status = 'active' AND expires_at <= $1
                    ORDER BY expires_at
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                 )
                 UPDATE reservations AS r
                 SET status = 'expired', released_at = $1
                 FROM lapsed
                 WHERE r.id = lapsed.id AND r.status = 'active'
                 RETURNING r.quantity",
            )
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("expire lapsed reservations", e))?;

            let mut batch = SweepBatch::default();
            for row in &quantities {
                let quantity: i32 = row.get("quantity");
                batch.expired += 1;
                batch.units_released += counter_from_db("quantity", i64::from(quantity))?;
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
            let result = sqlx::query(
                "WITH doomed AS (
                    SELECT id FROM reservations
                    WHERE (status IN ('expired', 'released')
                           AND COALESCE(released_at, expires_at) < $1)
                       OR ($2 AND status = 'fulfilled' AND fulfilled_at < $1)
                    LIMIT $3
                    FOR UPDATE SKIP LOCKED
                 )
                 DELETE FROM reservations AS r
                 USING doomed
                 WHERE r.id = doomed.id",
            )
            .bind(older_than)
            .bind(include_fulfilled)
            .bind(i64::from(limit))
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("purge terminal reservations", e))?;
            Ok(result.rows_affected())
        })
    }
}
