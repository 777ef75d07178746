//! `InfluxDB` 2.x client

use crate::error::{Error, Result};
use influxdb2::Client;
use reqwest::Url;
use std::future::Future;
use std::time::Duration;

/// Default upper bound for one request to the database
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `InfluxDB` 2.x client bound to one organization and bucket
#[derive(Debug)]
pub struct InfluxClient {
    client: Client,
    url: String,
    org: String,
    bucket: String,
    timeout: Duration,
}

/// Check that `url` is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::Config(format!("invalid InfluxDB url {url:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        _ => Err(Error::Config(format!(
            "invalid InfluxDB url {url:?}: expected http:// or https:// with a host"
        ))),
    }
}

impl InfluxClient {
    /// Create a new client
    pub fn new(url: &str, org: &str, bucket: &str, token: &str) -> Result<Self> {
        if url.is_empty() || org.is_empty() || bucket.is_empty() {
            return Err(Error::Config(
                "InfluxDB url, org and bucket must not be empty".to_string(),
            ));
        }
        // influxdb2 panics on URLs it cannot parse
        validate_url(url)?;

        tracing::debug!(
            "Creating InfluxDB client: url={}, org={}, bucket={}",
            url,
            org,
            bucket
        );
        let client = Client::new(url, org, token);

        Ok(Self {
            client,
            url: url.to_string(),
            org: org.to_string(),
            bucket: bucket.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{operation} exceeded {:?}", self.timeout)))?
    }

    /// Write line protocol data in a single request
    pub async fn write_line_protocol(&self, data: String) -> Result<()> {
        tracing::debug!(
            "Writing to InfluxDB: org={}, bucket={}, data_len={}",
            self.org,
            self.bucket,
            data.len()
        );

        self.bounded("InfluxDB write", async {
            self.client
                .write_line_protocol(&self.org, &self.bucket, data)
                .await
                .map_err(|e| Error::InfluxDB(format!("Write failed: {e}")))
        })
        .await
    }

    /// Health checking
    pub async fn ping(&self) -> Result<()> {
        let health_result = self
            .bounded("InfluxDB health check", async {
                self.client
                    .health()
                    .await
                    .map_err(|e| Error::InfluxDB(format!("Health check failed: {e}")))
            })
            .await?;

        tracing::debug!("InfluxDB health check: {:?}", health_result);

        let ready = self
            .bounded("InfluxDB ready check", async {
                self.client
                    .ready()
                    .await
                    .map_err(|e| Error::InfluxDB(format!("Ready check failed: {e}")))
            })
            .await?;

        if !ready {
            return Err(Error::InfluxDB("InfluxDB is not ready".to_string()));
        }

        Ok(())
    }
}
