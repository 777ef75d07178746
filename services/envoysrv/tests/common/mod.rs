//! Shared test doubles for the scrape path
#![allow(dead_code)]

use async_trait::async_trait;
use envoy_libs::Error;
use envoysrv::envoy::{
    Battery, CommCheckResponse, Connector, EnvoyApi, EnvoyError, EnvoyResult, Inverter, Line,
    Measurement, ProductionResponse,
};
use envoysrv::points::Point;
use envoysrv::sink::PointSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn unavailable() -> EnvoyError {
    EnvoyError::Status {
        code: 503,
        body: "unavailable".to_string(),
    }
}

pub fn sample_production() -> ProductionResponse {
    ProductionResponse {
        production: vec![Measurement {
            measurement_type: "production".to_string(),
            lines: vec![Line {
                w_now: 100.0,
                ..Default::default()
            }],
            ..Default::default()
        }],
        consumption: vec![],
    }
}

pub fn sample_inverters() -> Vec<Inverter> {
    vec![Inverter {
        serial_number: "123".to_string(),
        last_report_watts: 100,
        ..Default::default()
    }]
}

pub fn sample_batteries() -> Vec<Battery> {
    vec![Battery {
        serial_num: "456".to_string(),
        percent_full: 80,
        temperature: 25,
    }]
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub comm_check: AtomicUsize,
    pub production: AtomicUsize,
    pub inverters: AtomicUsize,
    pub batteries: AtomicUsize,
    pub invalidate: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        Self::get(&self.production) + Self::get(&self.inverters) + Self::get(&self.batteries)
    }
}

/// Gateway double with fixed answers per capability
pub struct MockEnvoy {
    pub comm_check_ok: bool,
    pub production: Option<ProductionResponse>,
    pub inverters: Option<Vec<Inverter>>,
    pub batteries: Option<Vec<Battery>>,
    /// Simulated latency of every data fetch
    pub fetch_delay: Duration,
    pub calls: Arc<CallCounts>,
}

impl MockEnvoy {
    /// All capabilities succeed with one reading each
    pub fn healthy() -> Self {
        Self {
            comm_check_ok: true,
            production: Some(sample_production()),
            inverters: Some(sample_inverters()),
            batteries: Some(sample_batteries()),
            fetch_delay: Duration::ZERO,
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// Liveness check passes but every category is empty
    pub fn empty() -> Self {
        Self {
            production: Some(ProductionResponse::default()),
            inverters: Some(vec![]),
            batteries: Some(vec![]),
            ..Self::healthy()
        }
    }

    async fn delay(&self) {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
    }
}

#[async_trait]
impl EnvoyApi for MockEnvoy {
    async fn comm_check(&self) -> EnvoyResult<CommCheckResponse> {
        self.calls.comm_check.fetch_add(1, Ordering::SeqCst);
        if self.comm_check_ok {
            Ok(CommCheckResponse::from([("123".to_string(), 5)]))
        } else {
            Err(EnvoyError::Unauthorized("session expired".to_string()))
        }
    }

    async fn production(&self) -> EnvoyResult<ProductionResponse> {
        self.calls.production.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.production.clone().ok_or_else(unavailable)
    }

    async fn inverters(&self) -> EnvoyResult<Vec<Inverter>> {
        self.calls.inverters.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.inverters.clone().ok_or_else(unavailable)
    }

    async fn batteries(&self) -> EnvoyResult<Vec<Battery>> {
        self.calls.batteries.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.batteries.clone().ok_or_else(unavailable)
    }

    fn invalidate_session(&self) {
        self.calls.invalidate.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink double recording every batch
#[derive(Clone, Default)]
pub struct MockSink {
    pub batches: Arc<Mutex<Vec<Vec<Point>>>>,
    pub fail: bool,
}

impl MockSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }
}

#[async_trait]
impl PointSink for MockSink {
    async fn write_points(&self, points: &[Point]) -> envoy_libs::Result<()> {
        self.batches.lock().push(points.to_vec());
        if self.fail {
            Err(Error::InfluxDB("write refused".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Connector double: fails a number of times, then hands out clients
/// built by `factory`, each sharing the same call counters
pub struct MockConnector {
    pub failures_left: AtomicUsize,
    pub attempts: Arc<AtomicUsize>,
    pub factory: fn() -> MockEnvoy,
    pub calls: Arc<CallCounts>,
}

impl MockConnector {
    pub fn new(factory: fn() -> MockEnvoy) -> Self {
        Self::failing_first(0, factory)
    }

    pub fn failing_first(failures: usize, factory: fn() -> MockEnvoy) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            attempts: Arc::new(AtomicUsize::new(0)),
            factory,
            calls: Arc::new(CallCounts::default()),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Client = MockEnvoy;

    async fn connect(&self) -> EnvoyResult<MockEnvoy> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EnvoyError::Auth("gateway unreachable".to_string()));
        }

        Ok(MockEnvoy {
            calls: self.calls.clone(),
            ..(self.factory)()
        })
    }
}
