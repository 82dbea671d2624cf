//! `boxoffice` daemon.
//!
//! Runs the expiry sweeper (and its retention purge) against the shared database,
//! pre-seeds the year's order sequences and exposes Prometheus metrics.

use anyhow::Context;
use boxoffice::telemetry::{init_tracing, install_metrics_exporter};
use boxoffice::{Application, Config};
use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_postgres::PostgresStore;
use boxoffice_runtime::ReservationEngine;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may be set by the deployment.
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    init_tracing(&config.server.log_level);
    config.validate().context("Invalid configuration")?;

    info!(
        max_connections = config.postgres.max_connections,
        order_prefix = %config.sequences.order_prefix,
        sweep_interval_secs = config.sweeper.interval,
        "Configuration loaded"
    );

    install_metrics_exporter(&config.server.metrics_host, config.server.metrics_port)
        .context("Failed to start metrics exporter")?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .idle_timeout(Duration::from_secs(config.postgres.idle_timeout))
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to database")?;

    let store = PostgresStore::new(pool.clone()).with_lock_timeout(config.lock_timeout());
    store.migrate().await.context("Failed to run migrations")?;
    info!("Database connected and migrated");

    let store = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = ReservationEngine::new(
        store.clone(),
        store,
        Arc::clone(&clock),
        config.engine_config(),
    );

    let app = Application::new(
        engine,
        clock,
        pool,
        Duration::from_secs(config.server.shutdown_timeout),
    );

    if config.sequences.seed_on_startup {
        app.seed_current_year(&config.sequences.order_prefix)
            .await
            .context("Failed to seed order sequences")?;
    }

    app.run().await;
    Ok(())
}
