//! Gateway device access
//!
//! The scrape path only depends on the [`EnvoyApi`] and [`Connector`] traits,
//! [`EnvoyClient`] is the HTTP implementation used in production.

mod client;
mod types;

pub use client::{ClientOptions, EnvoyClient, EnvoyConnector};
pub use types::{
    batteries_from_inventory, Battery, CommCheckResponse, Inverter, InventoryGroup, Line,
    Measurement, ProductionResponse, BATTERY_GROUP,
};

use async_trait::async_trait;
use thiserror::Error;

/// Device access error
#[derive(Debug, Error)]
pub enum EnvoyError {
    /// Transport level failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway rejected the session
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unexpected HTTP status
    #[error("Unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Session token could not be obtained
    #[error("Authentication failed: {0}")]
    Auth(String),
}

pub type EnvoyResult<T> = std::result::Result<T, EnvoyError>;

/// Capabilities of a connected gateway client
#[async_trait]
pub trait EnvoyApi: Send + Sync {
    /// Liveness/communication check
    async fn comm_check(&self) -> EnvoyResult<CommCheckResponse>;

    /// Production and consumption meter readings
    async fn production(&self) -> EnvoyResult<ProductionResponse>;

    /// Micro-inverter readings
    async fn inverters(&self) -> EnvoyResult<Vec<Inverter>>;

    /// Storage battery readings
    async fn batteries(&self) -> EnvoyResult<Vec<Battery>>;

    /// Drop cached authentication state
    fn invalidate_session(&self);
}

/// Builds connected gateway clients
#[async_trait]
pub trait Connector: Send + Sync {
    type Client: EnvoyApi;

    /// Construct a client, including whatever handshake the gateway needs
    async fn connect(&self) -> EnvoyResult<Self::Client>;
}
