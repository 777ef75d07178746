#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use common::{CallCounts, MockConnector, MockEnvoy, MockSink};
use envoy_libs::metrics;
use envoysrv::collector::Collector;
use envoysrv::poller::Poller;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_test::traced_test;

const INTERVAL: Duration = Duration::from_secs(5);

fn poller(connector: MockConnector, sink: MockSink) -> Poller<MockConnector, MockSink> {
    Poller::new(connector, sink, Collector::new("test"), INTERVAL)
}

#[tokio::test(start_paused = true)]
async fn test_first_scrape_is_immediate() {
    let connector = MockConnector::new(MockEnvoy::healthy);
    let sink = MockSink::default();
    let token = CancellationToken::new();

    let handle = tokio::spawn(poller(connector, sink.clone()).run(token.clone()));

    sleep(Duration::from_millis(1)).await;
    assert_eq!(sink.batch_count(), 1);

    sleep(INTERVAL).await;
    assert_eq!(sink.batch_count(), 2);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_interval_is_anchored_to_scrape_start() {
    let connector = MockConnector::new(|| MockEnvoy {
        fetch_delay: Duration::from_secs(1),
        ..MockEnvoy::healthy()
    });
    let sink = MockSink::default();
    let token = CancellationToken::new();

    let handle = tokio::spawn(poller(connector, sink.clone()).run(token.clone()));

    // Scrapes start at 0s and 5s, each taking 3s
    sleep(Duration::from_millis(3500)).await;
    assert_eq!(sink.batch_count(), 1);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.batch_count(), 2);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_with_backoff() {
    let connector = MockConnector::failing_first(2, MockEnvoy::healthy);
    let attempts = connector.attempts();
    let sink = MockSink::default();
    let token = CancellationToken::new();

    let handle = tokio::spawn(poller(connector, sink.clone()).run(token.clone()));

    sleep(Duration::from_millis(1)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(sink.batch_count(), 0);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.batch_count(), 1);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_triggers_reconnect() {
    let connector = MockConnector::new(|| MockEnvoy {
        comm_check_ok: false,
        ..MockEnvoy::healthy()
    });
    let attempts = connector.attempts();
    let calls = connector.calls.clone();
    let sink = MockSink::default();
    let token = CancellationToken::new();

    let handle = tokio::spawn(
        poller(connector, sink.clone())
            .with_reconnect_pause(Duration::from_secs(1))
            .run(token.clone()),
    );

    sleep(Duration::from_millis(2500)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(CallCounts::get(&calls.invalidate), 3);
    assert_eq!(calls.fetches(), 0);
    assert_eq!(sink.batch_count(), 0);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_interval_wait() {
    let connector = MockConnector::new(MockEnvoy::healthy);
    let sink = MockSink::default();
    let token = CancellationToken::new();

    let handle = tokio::spawn(poller(connector, sink.clone()).run(token.clone()));

    sleep(Duration::from_millis(1)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_millis(10), handle)
        .await
        .expect("scrape loop did not stop")
        .unwrap();
    assert_eq!(sink.batch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_connect_backoff() {
    let connector = MockConnector::failing_first(usize::MAX, MockEnvoy::healthy);
    let attempts = connector.attempts();
    let token = CancellationToken::new();

    let handle = tokio::spawn(poller(connector, MockSink::default()).run(token.clone()));

    sleep(Duration::from_secs(1)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_millis(10), handle)
        .await
        .expect("scrape loop did not stop")
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start() {
    let connector = MockConnector::new(MockEnvoy::healthy);
    let attempts = connector.attempts();
    let sink = MockSink::default();
    let token = CancellationToken::new();
    token.cancel();

    poller(connector, sink.clone()).run(token).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert_eq!(sink.batch_count(), 0);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_overrun_starts_next_scrape_immediately() {
    // Three fetches of 3s each: a 9s scrape against a 5s interval
    let connector = MockConnector::new(|| MockEnvoy {
        fetch_delay: Duration::from_secs(3),
        ..MockEnvoy::healthy()
    });
    let calls = connector.calls.clone();
    let sink = MockSink::default();
    let token = CancellationToken::new();
    let overruns_before = metrics::SCRAPE_OVERRUNS_TOTAL.get();

    let handle = tokio::spawn(
        poller(connector, sink.clone())
            .run(token.clone())
            .in_current_span(),
    );

    sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.batch_count(), 1);
    // Second scrape started at 9s without waiting
    assert_eq!(CallCounts::get(&calls.production), 2);
    assert!(metrics::SCRAPE_OVERRUNS_TOTAL.get() > overruns_before);
    assert!(logs_contain("longer than the"));

    token.cancel();
    handle.await.unwrap();
}
