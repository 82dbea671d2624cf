//! Expiry sweeper: background task that materialises lapsed holds as `expired`.
//!
//! Correctness never depends on it. Lapsed holds already stop counting the moment
//! `expires_at` passes and `fulfill` refuses them on its own; the sweeper only keeps
//! stored statuses honest for reporting and keeps the reservation table bounded.
//!
//! # Pattern: Tick-Sweep-Continue Loop
//!
//! ```text
//! loop {
//!     select! {
//!         shutdown => break,
//!         tick => {
//!             expire lapsed holds in batches until a short batch
//!             purge terminal rows past retention
//!             log errors (don't crash)
//!         }
//!     }
//! }
//! ```

use boxoffice_core::environment::Clock;
use boxoffice_core::{InventoryStore, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::metrics;
use crate::retry::{RetryPolicy, retry_transient};

/// Sweeper tunables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Reservations expired (or purged) per store call
    pub batch_size: u32,
    /// How long terminal reservations are kept, `None` disables purging
    pub retention: Option<Duration>,
    /// Whether fulfilled reservations are purged too
    pub purge_fulfilled: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 500,
            retention: Some(Duration::from_secs(30 * 24 * 60 * 60)),
            purge_fulfilled: false,
        }
    }
}

/// What one sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Holds moved to `expired`
    pub expired: u64,
    /// Units those holds had reserved
    pub units_released: u64,
    /// Terminal reservations deleted
    pub purged: u64,
}

/// Periodic expiry and retention job.
#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    config: SweeperConfig,
}

impl ExpirySweeper {
    /// Create a sweeper over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            config,
        }
    }

    /// Run one sweep to completion.
    ///
    /// Expires lapsed holds batch by batch until a batch comes back short, then purges
    /// terminal reservations past retention the same way. Safe to run concurrently
    /// with checkouts and with another sweeper.
    ///
    /// # Errors
    ///
    /// Storage failures. Work done by earlier batches stays committed.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let now = self.clock.now();
        let mut report = SweepReport::default();

        loop {
            let batch = retry_transient(&self.retry, "expire_lapsed", || {
                self.store.expire_lapsed(now, batch_size)
            })
            .await?;
            report.expired += batch.expired;
            report.units_released += batch.units_released;
            if batch.expired < u64::from(batch_size) {
                break;
            }
        }

        if let Some(retention) = self.config.retention {
            let cutoff = chrono::Duration::from_std(retention)
                .ok()
                .and_then(|retention| now.checked_sub_signed(retention));
            if let Some(cutoff) = cutoff {
                loop {
                    let purged = retry_transient(&self.retry, "purge_terminal", || {
                        self.store
                            .purge_terminal(cutoff, self.config.purge_fulfilled, batch_size)
                    })
                    .await?;
                    report.purged += purged;
                    if purged < u64::from(batch_size) {
                        break;
                    }
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_sweep(report.expired, report.purged, elapsed);
        if report.expired > 0 || report.purged > 0 {
            info!(
                expired = report.expired,
                units_released = report.units_released,
                purged = report.purged,
                elapsed_ms = elapsed * 1000.0,
                "Sweep completed"
            );
        }
        Ok(report)
    }

    /// Run the sweeper as a background task until `shutdown` fires.
    ///
    /// The first sweep runs immediately. A failed sweep is logged and the loop carries
    /// on with the next tick.
    #[must_use]
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.config.interval, batch_size = self.config.batch_size, "Expiry sweeper started");
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Expiry sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!(error = %e, "Expiry sweep failed");
                        }
                    }
                }
            }

            info!("Expiry sweeper stopped");
        })
    }
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
