//! Engine metrics.
//!
//! Recorded through the `metrics` facade; the binary installs the Prometheus exporter.
//! Without an installed recorder every call is a no-op, which is what tests rely on.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_reservations_total{outcome}` - holds by outcome (created, rejected,
//!   fulfilled, released, expired)
//! - `boxoffice_tickets_sold_total` - units confirmed on the ledger
//! - `boxoffice_tickets_refunded_total` - units requested back through `decrement_sale`
//! - `boxoffice_sweeper_expired_total` / `boxoffice_sweeper_purged_total`
//! - `boxoffice_order_numbers_issued_total{mode}`
//! - `boxoffice_transient_retries_total{operation}`
//! - `boxoffice_invariant_violations_total`
//! - `boxoffice_errors_total{operation}` - unexpected failures
//!
//! ## Gauges
//! - `boxoffice_sweep_duration_seconds` - duration of the last sweep

use boxoffice_core::{InventoryError, SequenceMode};
use metrics::{describe_counter, describe_gauge};

/// Register all metric descriptions.
///
/// Call once at startup, after installing the recorder.
pub fn register_engine_metrics() {
    describe_counter!(
        "boxoffice_reservations_total",
        "Reservations by outcome (created, rejected, fulfilled, released, expired)"
    );
    describe_counter!(
        "boxoffice_tickets_sold_total",
        "Ticket units confirmed on the inventory ledger"
    );
    describe_counter!(
        "boxoffice_tickets_refunded_total",
        "Ticket units returned through refunds or cancellations"
    );
    describe_counter!(
        "boxoffice_sweeper_expired_total",
        "Reservations expired by the sweeper"
    );
    describe_counter!(
        "boxoffice_sweeper_purged_total",
        "Terminal reservations deleted by retention"
    );
    describe_counter!(
        "boxoffice_order_numbers_issued_total",
        "Order numbers issued by mode"
    );
    describe_counter!(
        "boxoffice_transient_retries_total",
        "Retries caused by lock or serialization conflicts"
    );
    describe_counter!(
        "boxoffice_invariant_violations_total",
        "Detected sold_count > capacity violations"
    );
    describe_counter!(
        "boxoffice_errors_total",
        "Unexpected storage failures by operation"
    );
    describe_gauge!(
        "boxoffice_sweep_duration_seconds",
        "Duration of the last expiry sweep"
    );

    tracing::info!("Engine metrics registered");
}

/// Record the outcome of a reservation transition.
pub fn record_reservation(outcome: &'static str) {
    metrics::counter!("boxoffice_reservations_total", "outcome" => outcome).increment(1);
}

/// Record units confirmed on the ledger.
pub fn record_tickets_sold(quantity: u32) {
    metrics::counter!("boxoffice_tickets_sold_total").increment(u64::from(quantity));
}

/// Record units handed back.
pub fn record_tickets_refunded(quantity: u32) {
    metrics::counter!("boxoffice_tickets_refunded_total").increment(u64::from(quantity));
}

/// Record one sweep.
pub fn record_sweep(expired: u64, purged: u64, duration_secs: f64) {
    metrics::counter!("boxoffice_sweeper_expired_total").increment(expired);
    metrics::counter!("boxoffice_sweeper_purged_total").increment(purged);
    metrics::counter!("boxoffice_reservations_total", "outcome" => "expired").increment(expired);
    metrics::gauge!("boxoffice_sweep_duration_seconds").set(duration_secs);
}

/// Record an issued order number.
pub fn record_order_number(mode: SequenceMode) {
    let mode = match mode {
        SequenceMode::Production => "production",
        SequenceMode::Test => "test",
    };
    metrics::counter!("boxoffice_order_numbers_issued_total", "mode" => mode).increment(1);
}

/// Record retries spent on transient conflicts.
pub fn record_transient_retries(operation: &'static str, retries: u64) {
    metrics::counter!("boxoffice_transient_retries_total", "operation" => operation)
        .increment(retries);
}

/// Log and count a failed operation at the level its kind deserves.
///
/// Business outcomes stay at `debug`, integrity failures go to `error` and bump the
/// violation counter, everything else is a `warn`.
pub fn record_failure(operation: &'static str, error: &InventoryError) {
    if error.is_business_outcome() {
        tracing::debug!(operation, error = %error, "Request refused");
        return;
    }
    match error {
        InventoryError::InvariantViolation { .. } => {
            metrics::counter!("boxoffice_invariant_violations_total").increment(1);
            tracing::error!(operation, error = %error, "Inventory invariant violated");
        }
        InventoryError::SalesHalted(_) => {
            tracing::error!(operation, error = %error, "Operation on halted ticket type");
        }
        InventoryError::TransientConflict(_) | InventoryError::Storage(_) => {
            metrics::counter!("boxoffice_errors_total", "operation" => operation).increment(1);
            tracing::warn!(operation, error = %error, "Storage failure");
        }
        _ => tracing::debug!(operation, error = %error, "Request rejected"),
    }
}
