//! envoysrv configuration module
//! Flat YAML document merged with `ENVOY_` prefixed environment variables

use crate::{bail, Context, Result};
use envoy_libs::influxdb::validate_url;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "envoy.yaml";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_DEBUG_PORT: u16 = 6666;
const ENV_PREFIX: &str = "ENVOY_";

/// Complete exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Gateway address (host, host:port or URL)
    #[serde(default, deserialize_with = "lossy_string")]
    pub address: String,
    #[serde(rename = "serial", default, deserialize_with = "lossy_string")]
    pub serial_number: String,
    #[serde(default, deserialize_with = "lossy_string")]
    pub username: String,
    #[serde(default, deserialize_with = "lossy_string")]
    pub password: String,
    /// Pre-obtained session token
    #[serde(default, deserialize_with = "lossy_string")]
    pub jwt: String,
    #[serde(rename = "source", default, deserialize_with = "lossy_string")]
    pub source_tag: String,

    #[serde(rename = "influxdb", default, deserialize_with = "lossy_string")]
    pub influxdb_url: String,
    #[serde(default, deserialize_with = "lossy_string")]
    pub influxdb_token: String,
    #[serde(default, deserialize_with = "lossy_string")]
    pub influxdb_org: String,
    #[serde(default, deserialize_with = "lossy_string")]
    pub influxdb_bucket: String,

    /// Scrape interval in seconds, 0 falls back to the default
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_debug_port", alias = "expvar_port")]
    pub debug_port: u16,
    #[serde(default = "default_true")]
    pub comm_check: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_debug_port() -> u16 {
    DEFAULT_DEBUG_PORT
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Accepts scalars of any kind for string keys.
///
/// YAML and environment values such as `serial: 123456` arrive as numbers.
fn lossy_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        UInt(u64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Int(v) => v.to_string(),
        Scalar::UInt(v) => v.to_string(),
        Scalar::Float(v) => v.to_string(),
        Scalar::Bool(v) => v.to_string(),
    })
}

impl Config {
    /// Load the configuration file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("Configuration file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        Ok(config)
    }

    /// Load and validate in one step
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration completeness
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            bail!("missing required configuration: address");
        }
        if self.serial_number.is_empty() {
            bail!("missing required configuration: serial");
        }
        if !self.has_credentials() && self.jwt.is_empty() {
            bail!("missing Envoy authentication. Add username & password and optionally the JWT token");
        }
        if self.influxdb_url.is_empty() {
            bail!("missing required configuration: influxdb");
        }
        if let Err(e) = validate_url(&self.influxdb_url) {
            bail!("invalid configuration: influxdb: {}", e);
        }
        if self.influxdb_bucket.is_empty() {
            bail!("missing required configuration: influxdb_bucket");
        }
        if self.influxdb_token.is_empty() {
            bail!("missing required configuration: influxdb_token");
        }
        if self.influxdb_org.is_empty() {
            bail!("missing required configuration: influxdb_org");
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }

    /// Effective scrape interval
    pub fn interval(&self) -> Duration {
        match self.interval {
            0 => Duration::from_secs(DEFAULT_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Effective debug endpoint port
    pub fn debug_port(&self) -> u16 {
        match self.debug_port {
            0 => DEFAULT_DEBUG_PORT,
            port => port,
        }
    }
}
