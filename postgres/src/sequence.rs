//! [`SequenceStore`] on `order_sequences`.
//!
//! `next_number` makes sure the key exists (`INSERT ... ON CONFLICT DO NOTHING`), takes
//! the row lock with `SELECT ... FOR UPDATE`, and writes back the incremented value in
//! the same transaction, so numbers per key are totally ordered and never repeat.

use boxoffice_core::{Result, SequenceKey, SequenceStore, StoreFuture, sequence};
use sqlx::Row;
use sqlx::postgres::PgConnection;

use crate::rows::{counter_from_db, counter_to_db};
use crate::{PostgresStore, commit, db_error};

async fn ensure_key(conn: &mut PgConnection, key: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO order_sequences (sequence_key, last_number, created_at, updated_at)
         VALUES ($1, 0, NOW(), NOW())
         ON CONFLICT (sequence_key) DO NOTHING",
    )
    .bind(key)
    .execute(conn)
    .await
    .map_err(|e| db_error("seed sequence", e))?;
    Ok(())
}

impl SequenceStore for PostgresStore {
    fn seed(&self, key: SequenceKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| db_error("acquire connection", e))?;
            ensure_key(&mut conn, &key.as_storage_key()).await
        })
    }

    fn next_number(&self, key: SequenceKey) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let storage_key = key.as_storage_key();
            let mut tx = self.begin().await?;
            ensure_key(&mut tx, &storage_key).await?;

            let row = sqlx::query(
                "SELECT last_number FROM order_sequences WHERE sequence_key = $1 FOR UPDATE",
            )
            .bind(&storage_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("lock sequence", e))?;

            let last = counter_from_db("last_number", row.get("last_number"))?;
            let next = sequence::next_after(&key, last)?;

            sqlx::query(
                "UPDATE order_sequences SET last_number = $2, updated_at = NOW()
                 WHERE sequence_key = $1",
            )
            .bind(&storage_key)
            .bind(counter_to_db("last_number", next)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("advance sequence", e))?;

            commit(tx).await?;
            Ok(next)
        })
    }

    fn current(&self, key: SequenceKey) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT last_number FROM order_sequences WHERE sequence_key = $1")
                .bind(key.as_storage_key())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("read sequence", e))?;

            row.map(|row| counter_from_db("last_number", row.get("last_number")))
                .transpose()
        })
    }
}
