//! Metrics Server Integration Tests
//!
//! Tests for the Prometheus endpoint and the health/readiness probes.

use image_service::metrics::server::{MetricsServer, MetricsServerConfig, Readiness};
use reqwest::StatusCode;
use std::time::Duration;

async fn start(readiness: Readiness) -> (MetricsServer, String) {
    let mut server = MetricsServer::new(
        MetricsServerConfig {
            address: "127.0.0.1:0".to_string(),
        },
        readiness,
    );
    let addr = server.start().await.expect("Server should start");
    (server, format!("http://{}", addr))
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    image_service::metrics::record_upload_success(42, 1);
    let (mut server, base) = start(Readiness::default()).await;

    let response = reqwest::Client::new()
        .get(format!("{}/metrics", base))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Should get metrics");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.contains("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains("image_uploads_total"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_readiness_follows_flag() {
    let readiness = Readiness::default();
    let (mut server, base) = start(readiness.clone()).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/ready", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    readiness.set_ready(true);
    let response = client.get(format!("{}/ready", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (mut server, base) = start(Readiness::default()).await;

    let response = reqwest::get(format!("{}/nope", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}
