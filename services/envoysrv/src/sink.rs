//! Time-series sink
//!
//! A batch of points is written in one request. The scrape path only sees
//! [`PointSink`], the InfluxDB implementation lives here.

use crate::points::Point;
use async_trait::async_trait;
use envoy_libs::influxdb::InfluxClient;
use envoy_libs::Result;
use std::time::Duration;
use tracing::debug;

/// Destination for scraped points
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Persist a batch of points as one write
    async fn write_points(&self, points: &[Point]) -> Result<()>;
}

/// InfluxDB 2.x sink
#[derive(Debug)]
pub struct InfluxSink {
    client: InfluxClient,
}

impl InfluxSink {
    pub fn new(url: &str, org: &str, bucket: &str, token: &str) -> Result<Self> {
        Ok(Self {
            client: InfluxClient::new(url, org, bucket, token)?,
        })
    }

    /// Upper bound for each database request
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    /// Check that the database is reachable and ready
    pub async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }

    pub fn client(&self) -> &InfluxClient {
        &self.client
    }
}

/// Render a batch as newline separated line protocol
pub fn to_line_protocol(points: &[Point]) -> String {
    points
        .iter()
        .map(Point::to_line_protocol)
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write_points(&self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        debug!(
            "Writing {} points to bucket {}",
            points.len(),
            self.client.bucket()
        );
        self.client.write_line_protocol(to_line_protocol(points)).await
    }
}
