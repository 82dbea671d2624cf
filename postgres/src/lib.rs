//! `PostgreSQL` storage for the boxoffice reservation engine.
//!
//! [`PostgresStore`] implements both
//! [`InventoryStore`](boxoffice_core::InventoryStore) and
//! [`SequenceStore`](boxoffice_core::SequenceStore) on one connection pool.
//!
//! # Concurrency
//!
//! Every mutation runs in a READ COMMITTED transaction that takes a
//! `SELECT ... FOR UPDATE` row lock on the hot row (the ticket type, or the sequence
//! key) before reading anything it decides on. Paths that touch both a ticket type and
//! a reservation lock the ticket type first. Each transaction sets a local
//! `lock_timeout`; lock timeouts, deadlocks, serialization failures and pool timeouts
//! surface as [`InventoryError::TransientConflict`](boxoffice_core::InventoryError)
//! and the transaction is rolled back.
//!
//! The expiry sweep uses `FOR UPDATE SKIP LOCKED` so it never waits on a checkout.
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_postgres::PostgresStore;
//!
//! let store = PostgresStore::connect("postgres://localhost/boxoffice", 20).await?;
//! store.migrate().await?;
//! ```

mod error;
mod inventory;
mod rows;
mod sequence;

use boxoffice_core::{InventoryError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;

pub(crate) use error::db_error;

/// Default bound on how long a transaction waits for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// PostgreSQL-backed ledger, reservation and sequence store.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Create a store on an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Connect a new pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Storage`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| InventoryError::Storage(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Override the per-transaction lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InventoryError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Configured lock timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Begin a transaction with the local lock timeout applied.
    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("set lock_timeout", e))?;

        Ok(tx)
    }
}

/// Commit, mapping failures the same way as statements.
async fn commit(tx: Transaction<'static, Postgres>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| db_error("commit transaction", e))
}
