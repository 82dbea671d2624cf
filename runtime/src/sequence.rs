//! Sequence allocator: unique, strictly increasing order numbers per `PREFIX-YEAR`.

use boxoffice_core::{OrderNumber, Result, SequenceKey, SequenceMode, SequenceStore};
use std::sync::Arc;

use crate::metrics;
use crate::retry::{RetryPolicy, retry_transient};

/// Issues order numbers.
///
/// Numbers are never reused: a number drawn for a checkout that is later abandoned is
/// simply skipped, so gaps are expected and duplicates impossible.
#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn SequenceStore>,
    retry: RetryPolicy,
}

impl SequenceAllocator {
    /// Create an allocator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SequenceStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Atomically draw the next number for `key`, creating the key on first use.
    ///
    /// # Errors
    ///
    /// Storage failures, or [`TransientConflict`](boxoffice_core::InventoryError::TransientConflict)
    /// once retries are exhausted.
    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn next_number(&self, key: &SequenceKey) -> Result<OrderNumber> {
        let number = retry_transient(&self.retry, "next_number", || {
            self.store.next_number(key.clone())
        })
        .await
        .inspect_err(|e| metrics::record_failure("next_number", e))?;

        let order = OrderNumber {
            key: key.clone(),
            number,
        };
        metrics::record_order_number(key.mode());
        tracing::debug!(order_number = %order, "Order number issued");
        Ok(order)
    }

    /// Draw the next order number for `prefix` and `year` in the given mode.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use boxoffice_core::SequenceMode;
    /// use boxoffice_runtime::{SequenceAllocator, retry::RetryPolicy};
    /// use boxoffice_testing::InMemorySequenceStore;
    ///
    /// # async fn example() -> boxoffice_core::Result<()> {
    /// let allocator = SequenceAllocator::new(Arc::new(InMemorySequenceStore::new()), RetryPolicy::default());
    /// let order = allocator.next_order_number("ALCBF", 2026, SequenceMode::Test).await?;
    /// assert_eq!(order.to_string(), "TEST-ALCBF-2026-00001");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Invalid prefixes, plus everything [`next_number`](Self::next_number) returns.
    pub async fn next_order_number(
        &self,
        prefix: &str,
        year: i32,
        mode: SequenceMode,
    ) -> Result<OrderNumber> {
        let key = SequenceKey::for_mode(prefix, year, mode)?;
        self.next_number(&key).await
    }

    /// Create `key` with `last_number = 0` unless it exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    pub async fn seed(&self, key: &SequenceKey) -> Result<()> {
        retry_transient(&self.retry, "seed_sequence", || self.store.seed(key.clone())).await?;
        tracing::debug!(key = %key, "Sequence key seeded");
        Ok(())
    }

    /// Last number issued for `key`, `None` if the key was never created.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    pub async fn current(&self, key: &SequenceKey) -> Result<Option<u64>> {
        retry_transient(&self.retry, "current_sequence", || {
            self.store.current(key.clone())
        })
        .await
    }
}

impl std::fmt::Debug for SequenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAllocator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boxoffice_testing::{FlakyStore, InMemorySequenceStore};

    #[tokio::test]
    async fn production_and_test_ranges_are_independent() {
        let allocator =
            SequenceAllocator::new(Arc::new(InMemorySequenceStore::new()), RetryPolicy::no_retry());

        let live = allocator
            .next_order_number("ALCBF", 2026, SequenceMode::Production)
            .await
            .unwrap();
        let rehearsal = allocator
            .next_order_number("ALCBF", 2026, SequenceMode::Test)
            .await
            .unwrap();
        let live_again = allocator
            .next_order_number("ALCBF", 2026, SequenceMode::Production)
            .await
            .unwrap();

        assert_eq!(live.to_string(), "ALCBF-2026-00001");
        assert_eq!(rehearsal.to_string(), "TEST-ALCBF-2026-00001");
        assert_eq!(live_again.number, 2);
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_keeps_progress() {
        let allocator =
            SequenceAllocator::new(Arc::new(InMemorySequenceStore::new()), RetryPolicy::no_retry());
        let key = SequenceKey::new("ALCBF", 2027).unwrap();

        allocator.seed(&key).await.unwrap();
        assert_eq!(allocator.current(&key).await.unwrap(), Some(0));
        allocator.next_number(&key).await.unwrap();
        allocator.seed(&key).await.unwrap();
        assert_eq!(allocator.current(&key).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn failed_attempts_do_not_burn_numbers() {
        let flaky = Arc::new(FlakyStore::new(InMemorySequenceStore::new()));
        let allocator = SequenceAllocator::new(
            flaky.clone(),
            RetryPolicy::builder()
                .initial_delay(std::time::Duration::from_millis(1))
                .build(),
        );
        let key = SequenceKey::new("ALCBF", 2026).unwrap();

        flaky.fail_next(3);
        assert_eq!(allocator.next_number(&key).await.unwrap().number, 1);
        assert_eq!(flaky.calls(), 4);
    }
}
