//! `InfluxDB` client module
//!
//! Provides the basic `InfluxDB` operations:
//! - HTTP client (line protocol writes, health checking)
//! - line protocol building

mod builder;
mod client;

pub use builder::{FieldValue, LineProtocolBuilder};
pub use client::{validate_url, InfluxClient, DEFAULT_TIMEOUT};
