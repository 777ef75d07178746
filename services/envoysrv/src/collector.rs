//! Single scrape cycle
//!
//! Liveness check, independent category fetches, point conversion and one
//! batch write. Category failures are logged and skipped; only a failed
//! liveness check aborts the cycle.

use crate::envoy::{EnvoyApi, EnvoyError};
use crate::points::TelemetrySnapshot;
use crate::sink::PointSink;
use chrono::Utc;
use envoy_libs::metrics;
use tracing::{debug, error, warn};

/// Result of one scrape cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeOutcome {
    /// Points handed to the sink
    pub points_written: usize,
    /// The gateway session must be re-established before the next cycle
    pub session_invalid: bool,
}

impl ScrapeOutcome {
    fn invalid() -> Self {
        Self {
            points_written: 0,
            session_invalid: true,
        }
    }
}

/// Performs scrape cycles for one gateway
#[derive(Debug, Clone)]
pub struct Collector {
    source_tag: String,
    comm_check: bool,
}

impl Collector {
    pub fn new(source_tag: impl Into<String>) -> Self {
        Self {
            source_tag: source_tag.into(),
            comm_check: true,
        }
    }

    /// Enable or disable the liveness check before each cycle
    #[must_use]
    pub fn with_comm_check(mut self, enabled: bool) -> Self {
        self.comm_check = enabled;
        self
    }

    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    /// Run one scrape cycle against `client`, writing the result to `sink`
    pub async fn scrape_once<C, S>(&self, client: &C, sink: &S) -> ScrapeOutcome
    where
        C: EnvoyApi + ?Sized,
        S: PointSink + ?Sized,
    {
        let timestamp = Utc::now();

        if self.comm_check {
            if let Err(e) = client.comm_check().await {
                warn!("Gateway liveness check failed: {}", e);
                client.invalidate_session();
                metrics::SESSION_INVALIDATIONS_TOTAL.inc();
                return ScrapeOutcome::invalid();
            }
        }

        let snapshot = TelemetrySnapshot {
            production: ok_or_log("production", client.production().await),
            inverters: ok_or_log("inverters", client.inverters().await),
            batteries: ok_or_log("batteries", client.batteries().await),
        };

        let points = snapshot.to_points(&self.source_tag, timestamp);
        if points.is_empty() {
            debug!("Scrape produced no points");
            return ScrapeOutcome::default();
        }

        if let Err(e) = sink.write_points(&points).await {
            error!("Failed to write {} points: {}", points.len(), e);
            metrics::SINK_ERRORS_TOTAL.inc();
        }

        ScrapeOutcome {
            points_written: points.len(),
            session_invalid: false,
        }
    }
}

fn ok_or_log<T>(category: &str, result: Result<T, EnvoyError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Failed to fetch {}: {}", category, e);
            metrics::record_fetch_error(category);
            None
        }
    }
}
