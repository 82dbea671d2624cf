//! Mapping of sqlx errors onto the engine's error taxonomy.

use boxoffice_core::InventoryError;

/// `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";
/// `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// `lock_not_available`, raised when `lock_timeout` elapses
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Whether `code` is a SQLSTATE that is safe to retry as a whole transaction.
fn is_transient(code: &str) -> bool {
    matches!(
        code,
        SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE
    )
}

/// Convert a sqlx error raised while doing `context`.
///
/// Lock conflicts and pool exhaustion become
/// [`TransientConflict`](InventoryError::TransientConflict); everything else is
/// [`Storage`](InventoryError::Storage).
pub(crate) fn db_error(context: &str, error: sqlx::Error) -> InventoryError {
    match &error {
        sqlx::Error::Database(db) if db.code().as_deref().is_some_and(is_transient) => {
            InventoryError::TransientConflict(format!("{context}: {db}"))
        }
        sqlx::Error::PoolTimedOut => {
            InventoryError::TransientConflict(format!("{context}: connection pool timed out"))
        }
        _ => InventoryError::Storage(format!("{context}: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sqlstates() {
        assert!(is_transient("40001"));
        assert!(is_transient("40P01"));
        assert!(is_transient("55P03"));
        assert!(!is_transient("23505"));
        assert!(!is_transient("23514"));
    }

    #[test]
    fn pool_timeouts_are_transient() {
        assert!(db_error("reserve", sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!db_error("reserve", sqlx::Error::RowNotFound).is_retryable());
    }
}
