//! envoysrv - Enphase Envoy gateway to InfluxDB exporter
//!
//! Polls the gateway for production, inverter and battery telemetry on a
//! fixed interval and writes the readings to InfluxDB.

pub mod api;
pub mod collector;
pub mod config;
pub mod envoy;
pub mod points;
pub mod poller;
pub mod sink;

/// Unified Result type for the service binary
pub type Result<T> = anyhow::Result<T>;

/// Service information
pub const SERVICE_NAME: &str = "envoysrv";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use anyhow::{anyhow, bail, Context};
