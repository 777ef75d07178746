//! Exporter metrics
//!
//! Process-wide counters registered in the default prometheus registry and
//! served by the debug endpoint.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

/// Completed scrape cycles
pub static SCRAPES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("envoy_scrapes_total", "Total number of completed scrape cycles")
        .expect("Failed to register envoy_scrapes_total metric")
});

/// Points produced by scrape cycles
pub static POINTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "envoy_points_total",
        "Total number of points produced by scrape cycles"
    )
    .expect("Failed to register envoy_points_total metric")
});

/// Failed data fetches per category
pub static FETCH_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "envoy_fetch_errors_total",
        "Total number of failed gateway data fetches",
        &["category"]
    )
    .expect("Failed to register envoy_fetch_errors_total metric")
});

/// Failed sink writes
pub static SINK_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "envoy_sink_errors_total",
        "Total number of failed batch writes"
    )
    .expect("Failed to register envoy_sink_errors_total metric")
});

/// Session invalidations caused by failed liveness checks
pub static SESSION_INVALIDATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "envoy_session_invalidations_total",
        "Total number of gateway session invalidations"
    )
    .expect("Failed to register envoy_session_invalidations_total metric")
});

/// Gateway connection attempts by result
pub static CONNECT_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "envoy_connect_attempts_total",
        "Total number of gateway connection attempts",
        &["result"]
    )
    .expect("Failed to register envoy_connect_attempts_total metric")
});

/// Scrapes that took longer than the configured interval
pub static SCRAPE_OVERRUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "envoy_scrape_overruns_total",
        "Total number of scrapes exceeding the scrape interval"
    )
    .expect("Failed to register envoy_scrape_overruns_total metric")
});

/// Scrape cycle duration
pub static SCRAPE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "envoy_scrape_duration_seconds",
        "Scrape cycle duration in seconds"
    )
    .expect("Failed to register envoy_scrape_duration_seconds metric")
});

/// Record one finished scrape cycle
pub fn record_scrape(points: usize, duration_secs: f64) {
    SCRAPES_TOTAL.inc();
    POINTS_TOTAL.inc_by(points as u64);
    SCRAPE_DURATION.observe(duration_secs);
}

/// Record a failed fetch for one data category
pub fn record_fetch_error(category: &str) {
    FETCH_ERRORS_TOTAL.with_label_values(&[category]).inc();
}

/// Record a gateway connection attempt
pub fn record_connect_attempt(success: bool) {
    let result = if success { "success" } else { "failure" };
    CONNECT_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
}

/// Get metrics in Prometheus text format
pub fn get_metrics_text() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
