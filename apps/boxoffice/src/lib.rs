//! Deployment wiring for the boxoffice reservation engine.
//!
//! The checkout and catalog services embed [`boxoffice_runtime::ReservationEngine`]
//! directly. This crate hosts what runs on its own: configuration loading, the
//! Prometheus exporter, and the `boxoffice` daemon that keeps the expiry sweeper
//! running against the shared database.

pub mod config;
pub mod lifecycle;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use lifecycle::Application;
