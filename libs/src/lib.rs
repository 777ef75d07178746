//! `Envoy` exporter basic library
//!
//! Provides the infrastructure shared by the exporter services:
//! - `InfluxDB` client and line protocol encoding
//! - process metrics
//! - error processing
//! - logging and shutdown handling

#[cfg(feature = "influxdb")]
pub mod influxdb;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{Error, Result};
