//! Scrape loop
//!
//! Owns the gateway client lifecycle: connect with a fixed backoff, scrape
//! once per interval, reconnect when a cycle reports an invalid session.
//! Shutdown is observed at the top of each iteration and at every wait.

use crate::collector::{Collector, ScrapeOutcome};
use crate::envoy::Connector;
use crate::sink::PointSink;
use crate::{Context, Result};
use envoy_libs::metrics;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Time left to wait before the next scrape, `None` when the scrape overran.
///
/// The interval is measured from the start of the previous scrape.
pub fn next_delay(elapsed: Duration, interval: Duration) -> Option<Duration> {
    if elapsed > interval {
        None
    } else {
        Some(interval - elapsed)
    }
}

/// Await a spawned scrape loop; a panicked or aborted loop is an error
pub async fn join_loop(handle: JoinHandle<()>) -> Result<()> {
    handle.await.context("Scrape loop task ended abnormally")
}

/// Sleep unless cancelled first; returns `false` on cancellation
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = shutdown.cancelled() => false,
    }
}

/// Fixed-interval scrape loop for one gateway
pub struct Poller<K, S> {
    connector: K,
    sink: S,
    collector: Collector,
    interval: Duration,
    connect_backoff: Duration,
    reconnect_pause: Duration,
}

impl<K, S> Poller<K, S>
where
    K: Connector,
    S: PointSink,
{
    pub fn new(connector: K, sink: S, collector: Collector, interval: Duration) -> Self {
        Self {
            connector,
            sink,
            collector,
            interval,
            connect_backoff: DEFAULT_CONNECT_BACKOFF,
            reconnect_pause: DEFAULT_RECONNECT_PAUSE,
        }
    }

    /// Delay between failed connection attempts
    #[must_use]
    pub fn with_connect_backoff(mut self, backoff: Duration) -> Self {
        self.connect_backoff = backoff;
        self
    }

    /// Pause before reconnecting after an invalid session
    #[must_use]
    pub fn with_reconnect_pause(mut self, pause: Duration) -> Self {
        self.reconnect_pause = pause;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Starting scrape loop with interval {:?}, source tag {:?}",
            self.interval,
            self.collector.source_tag()
        );

        while let Some(client) = self.connect(&shutdown).await {
            info!("Connected to gateway");
            if !self.scrape_until_invalid(&client, &shutdown).await {
                break;
            }
            warn!(
                "Gateway session invalid, reconnecting in {:?}",
                self.reconnect_pause
            );
            if !sleep_or_cancel(self.reconnect_pause, &shutdown).await {
                break;
            }
        }

        info!("Scrape loop stopped");
    }

    /// Connect, retrying on the backoff delay; `None` once shut down
    async fn connect(&self, shutdown: &CancellationToken) -> Option<K::Client> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }

            match self.connector.connect().await {
                Ok(client) => {
                    metrics::record_connect_attempt(true);
                    return Some(client);
                }
                Err(e) => {
                    metrics::record_connect_attempt(false);
                    error!(
                        "Failed to connect to gateway: {}. Retrying in {:?}",
                        e, self.connect_backoff
                    );
                }
            }

            if !sleep_or_cancel(self.connect_backoff, shutdown).await {
                return None;
            }
        }
    }

    /// Scrape until the session turns invalid (`true`) or shutdown (`false`)
    async fn scrape_until_invalid(&self, client: &K::Client, shutdown: &CancellationToken) -> bool {
        loop {
            if shutdown.is_cancelled() {
                return false;
            }

            let started = Instant::now();
            let outcome: ScrapeOutcome = self.collector.scrape_once(client, &self.sink).await;
            let elapsed = started.elapsed();
            metrics::record_scrape(outcome.points_written, elapsed.as_secs_f64());

            if outcome.session_invalid {
                return true;
            }

            info!(
                "Scrape completed in {:?}, {} points",
                elapsed, outcome.points_written
            );

            match next_delay(elapsed, self.interval) {
                Some(delay) => {
                    if !sleep_or_cancel(delay, shutdown).await {
                        return false;
                    }
                }
                None => {
                    warn!(
                        "Scrape took {:?}, longer than the {:?} interval",
                        elapsed, self.interval
                    );
                    metrics::SCRAPE_OVERRUNS_TOTAL.inc();
                }
            }
        }
    }
}
