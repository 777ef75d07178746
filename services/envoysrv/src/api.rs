//! Debug endpoint
//!
//! Serves process metrics and a health probe on localhost. Best effort:
//! failures are logged and never affect scraping.

use crate::{SERVICE_NAME, SERVICE_VERSION};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use envoy_libs::metrics;
use serde_json::json;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
    }))
}

async fn metrics_text() -> impl IntoResponse {
    match metrics::get_metrics_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        ),
    }
}

/// Serve on an already bound listener until `shutdown` is cancelled
pub async fn serve_on(listener: TcpListener, shutdown: CancellationToken) {
    let result = axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = result {
        error!("Debug endpoint failed: {}", e);
    }
}

/// Bind `127.0.0.1:port` and serve until `shutdown` is cancelled
pub async fn serve(port: u16, shutdown: CancellationToken) {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind debug endpoint on {}: {}", addr, e);
            return;
        }
    };

    info!("Debug endpoint listening on http://{}", addr);
    serve_on(listener, shutdown).await;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

    use super::*;

    async fn spawn_server() -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve_on(listener, token.clone()));
        (format!("http://{addr}"), token, handle)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (base, token, handle) = spawn_server().await;

        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_NAME);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::record_scrape(1, 0.1);
        let (base, token, handle) = spawn_server().await;

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert!(response.status().is_success());
        let text = response.text().await.unwrap();
        assert!(text.contains("envoy_scrapes_total"));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_not_fatal() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        // Returns instead of panicking or blocking
        serve(port, CancellationToken::new()).await;
    }
}
