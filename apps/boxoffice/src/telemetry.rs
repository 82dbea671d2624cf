//! Logging and Prometheus exporter setup.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Metrics address does not parse
    #[error("Invalid metrics address {0}")]
    Address(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Serve Prometheus metrics on `host:port` and register the engine's metric
/// descriptions.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError`] if the address is invalid or a recorder cannot be
/// installed. An already installed recorder is logged and tolerated.
pub fn install_metrics_exporter(host: &str, port: u16) -> Result<SocketAddr, MetricsError> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|_| MetricsError::Address(format!("{host}:{port}")))?;

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(%addr, "Metrics server started - available at http://{addr}/metrics");
        }
        Err(e) => {
            let err_msg = e.to_string();
            if !err_msg.contains("already initialized") {
                return Err(MetricsError::Install(err_msg));
            }
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
        }
    }

    boxoffice_runtime::metrics::register_engine_metrics();
    Ok(addr)
}
