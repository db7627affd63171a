//! gRPC server module
//!
//! Process shell around the writer and reader services: binds the
//! listener, registers the service for the configured [`Role`], and drives
//! graceful shutdown.
//!
//! # Shutdown
//!
//! ```text
//! signal ──> stop accepting ──> drain in-flight calls ──(grace period)──> cancel CallContext
//! ```

use crate::config::Config;
use crate::metrics::server::{MetricsServer, MetricsServerConfig, MetricsServerError, Readiness};
use crate::storage::{self, Store, StoreError};
use crate::upload::{CallContext, UploadError};
use bytes::Bytes;
use clap::ValueEnum;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tonic::Status;
use tracing::info;

pub mod reader;
pub mod writer;

pub use reader::ReaderService;
pub use writer::WriterService;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Metrics server error: {0}")]
    MetricsError(#[from] MetricsServerError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Which service this process exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// `ImageServiceWriter`: Upload and Delete
    #[default]
    Writer,
    /// `ImageServiceReader`: Get
    Reader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Writer => "writer",
            Role::Reader => "reader",
        })
    }
}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Status::not_found(err.to_string()),
            StoreError::Backend(_) => Status::internal(err.to_string()),
            StoreError::Cancelled => Status::cancelled(err.to_string()),
        }
    }
}

impl From<UploadError> for Status {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NoKey | UploadError::NoContentType => {
                Status::invalid_argument(err.to_string())
            }
            UploadError::Transport(status) => status,
            UploadError::Store(store_err) => store_err.into(),
            UploadError::Cancelled => Status::cancelled(err.to_string()),
        }
    }
}

/// Attach the response a failed call already produced to its error status.
///
/// The message is protobuf-encoded into the status details.
pub fn with_response<M: prost::Message>(status: Status, response: &M) -> Status {
    Status::with_details(
        status.code(),
        status.message(),
        Bytes::from(response.encode_to_vec()),
    )
}

/// gRPC Server
#[derive(Debug)]
pub struct Server {
    config: Config,
    role: Role,
    addr: SocketAddr,
    readiness: Readiness,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, role: Role) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("{}", e)))?;

        Ok(Self {
            config,
            role,
            addr,
            readiness: Readiness::default(),
        })
    }

    /// Readiness flag shared with the metrics server
    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Build the store, bind the listener and serve until Ctrl-C / SIGTERM
    pub async fn run(&self) -> Result<(), ServerError> {
        let store = storage::from_config(&self.config.storage).await?;

        let mut metrics_server = None;
        if self.config.metrics.enabled {
            let mut server = MetricsServer::new(
                MetricsServerConfig {
                    address: format!("0.0.0.0:{}", self.config.metrics.port),
                },
                self.readiness(),
            );
            server.start().await?;
            metrics_server = Some(server);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        let result = self.serve(listener, store, shutdown_signal()).await;

        if let Some(mut server) = metrics_server {
            server.shutdown().await;
        }
        result
    }

    /// Serve the configured role on `listener` until `shutdown` resolves.
    ///
    /// After `shutdown` the listener stops accepting and in-flight calls
    /// drain. Calls still running when the grace period ends are cancelled.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        store: Arc<dyn Store>,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        let (context, cancel) = CallContext::with_cancel();
        let grace = Duration::from_secs(self.config.server.shutdown_grace_period_secs);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let readiness = self.readiness();
        let watchdog = tokio::spawn(async move {
            shutdown.await;
            readiness.set_ready(false);
            info!("Shutdown requested, draining in-flight calls");
            let _ = stop_tx.send(());
            tokio::time::sleep(grace).await;
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "Grace period elapsed, cancelling remaining calls"
            );
            cancel.cancel();
        });

        let mut builder = tonic::transport::Server::builder();
        if let Some(secs) = self.config.server.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let signal = async {
            let _ = stop_rx.await;
        };

        info!(role = %self.role, addr = %local_addr, "gRPC server listening");
        self.readiness.set_ready(true);

        let result = match self.role {
            Role::Writer => {
                let service = WriterService::with_context(store, context)
                    .into_server(self.config.server.max_message_bytes);
                builder
                    .add_service(service)
                    .serve_with_incoming_shutdown(incoming(listener), signal)
                    .await
            }
            Role::Reader => {
                let service = ReaderService::with_context(store, context).into_server();
                builder
                    .add_service(service)
                    .serve_with_incoming_shutdown(incoming(listener), signal)
                    .await
            }
        };

        self.readiness.set_ready(false);
        watchdog.abort();
        result.map_err(|e| ServerError::RuntimeError(e.to_string()))?;

        info!("Shutting down server");
        Ok(())
    }
}

/// Accepted connections from `listener`, with Nagle disabled
fn incoming(
    listener: TcpListener,
) -> std::pin::Pin<Box<impl futures::Stream<Item = std::io::Result<TcpStream>>>> {
    Box::pin(futures::stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(stream, _)| {
            let _ = stream.set_nodelay(true);
            stream
        });
        Some((accepted, listener))
    }))
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;
    use crate::config::{MetricsConfig, ServerConfig, StorageBackend, StorageConfig};
    use crate::pb::{DeleteResponse, UploadResponse, UploadStatus};
    use prost::Message;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
                shutdown_grace_period_secs: 1,
                request_timeout_secs: None,
                max_message_bytes: 4194304,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                s3: None,
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 0,
            },
        }
    }

    #[test]
    fn test_server_new() {
        assert!(Server::new(test_config(), Role::Writer).is_ok());
    }

    #[test]
    fn test_server_invalid_address() {
        let mut config = test_config();
        config.server.address = "invalid".into();
        assert!(Server::new(config, Role::Reader).is_err());
    }

    #[test]
    fn test_upload_error_codes() {
        let cases = [
            (UploadError::NoKey, Code::InvalidArgument),
            (UploadError::NoContentType, Code::InvalidArgument),
            (UploadError::Cancelled, Code::Cancelled),
            (
                UploadError::Store(StoreError::Backend("x".into())),
                Code::Internal,
            ),
            (
                UploadError::Store(StoreError::NotFound("k".into())),
                Code::NotFound,
            ),
            (
                UploadError::Transport(Status::unavailable("gone")),
                Code::Unavailable,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn test_validation_messages_reach_the_client() {
        let status = Status::from(UploadError::NoKey);
        assert_eq!(status.message(), "key cannot be empty");
    }

    #[test]
    fn test_with_response_round_trips_details() {
        let mut response = UploadResponse::default();
        response.set_upload_status(UploadStatus::Error);
        let status = with_response(Status::internal("write failed"), &response);

        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "write failed");
        let decoded = UploadResponse::decode(status.details()).unwrap();
        assert_eq!(decoded.upload_status(), UploadStatus::Error);

        let status = with_response(Status::not_found("k"), &DeleteResponse { ok: false });
        assert!(!DeleteResponse::decode(status.details()).unwrap().ok);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Writer.to_string(), "writer");
        assert_eq!(Role::Reader.to_string(), "reader");
    }
}
