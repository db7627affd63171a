//! Prometheus Metrics HTTP Server
//!
//! Serves `/metrics` for scraping plus two probes:
//!
//! - `/health` - always `200` while the process is up
//! - `/ready` - `200` while the gRPC listener accepts calls, `503` before
//!   it is bound and once shutdown has started
//!
//! # Example
//!
//! ```no_run
//! use image_service::metrics::server::{MetricsServer, MetricsServerConfig, Readiness};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let readiness = Readiness::default();
//!     let mut server = MetricsServer::new(
//!         MetricsServerConfig { address: "127.0.0.1:9090".to_string() },
//!         readiness.clone(),
//!     );
//!     let addr = server.start().await?;
//!     readiness.set_ready(true);
//!     println!("Metrics server listening on {}", addr);
//!     Ok(())
//! }
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Configuration for the metrics server
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:9090")
    pub address: String,
}

/// Whether the gRPC service is currently accepting calls
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Metrics server error
#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Prometheus metrics HTTP server
#[derive(Debug)]
pub struct MetricsServer {
    config: MetricsServerConfig,
    readiness: Readiness,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, readiness: Readiness) -> Self {
        Self {
            config,
            readiness,
            shutdown_tx: None,
            server_handle: None,
        }
    }

    /// Start serving in the background.
    ///
    /// Returns the bound address (useful when using port 0)
    pub async fn start(&mut self) -> Result<SocketAddr, MetricsServerError> {
        let listener = TcpListener::bind(&self.config.address).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let readiness = self.readiness.clone();
        self.server_handle = Some(tokio::spawn(async move {
            run_server(listener, readiness, shutdown_rx).await;
        }));

        tracing::info!(%addr, "Metrics server listening");
        Ok(addr)
    }

    /// Stop accepting scrapes and wait for the accept loop to exit
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }
}

async fn run_server(
    listener: TcpListener,
    readiness: Readiness,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            result = listener.accept() => {
                let Ok((stream, _)) = result else { continue };
                let io = TokioIo::new(stream);
                let readiness = readiness.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let readiness = readiness.clone();
                        async move { handle_request(req, &readiness) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!(error = %e, "Metrics connection closed with error");
                    }
                });
            }
        }
    }
}

fn handle_request(
    req: Request<hyper::body::Incoming>,
    readiness: &Readiness,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => metrics_response(),
        (&Method::GET, "/health") => text(StatusCode::OK, "application/json", r#"{"status":"ok"}"#),
        (&Method::GET, "/ready") if readiness.is_ready() => {
            text(StatusCode::OK, "application/json", r#"{"status":"ready"}"#)
        }
        (&Method::GET, "/ready") => text(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            r#"{"status":"not_ready"}"#,
        ),
        _ => text(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            "Failed to encode metrics",
        );
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(value) = encoder.format_type().parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

fn text(status: StatusCode, content_type: &'static str, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_toggles() {
        let readiness = Readiness::default();
        assert!(!readiness.is_ready());
        let shared = readiness.clone();
        shared.set_ready(true);
        assert!(readiness.is_ready());
    }

    #[test]
    fn test_metrics_response_is_prometheus_text() {
        crate::metrics::record_error("test");
        let response = metrics_response();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[hyper::header::CONTENT_TYPE]
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
