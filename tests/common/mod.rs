//! Shared helpers for the gRPC integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image_service::config::{
    Config, MetricsConfig, ServerConfig, StorageBackend, StorageConfig,
};
use image_service::pb::UploadRequest;
use image_service::server::{Role, Server};
use image_service::storage::{Store, StoreError, StoredObject};
use image_service::upload::CallContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A server running on an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Trigger graceful shutdown and wait for the server to stop
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

pub fn test_config(grace_secs: u64) -> Config {
    Config {
        server: ServerConfig {
            address: "127.0.0.1:0".into(),
            shutdown_grace_period_secs: grace_secs,
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

pub async fn spawn_server(role: Role, store: Arc<dyn Store>) -> TestServer {
    spawn_server_with(test_config(5), role, store).await
}

pub async fn spawn_server_with(config: Config, role: Role, store: Arc<dyn Store>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = Server::new(config, role).unwrap();
    let handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        server.serve(listener, store, shutdown).await.unwrap();
    });

    TestServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        handle,
    }
}

pub fn chunk(key: &str, content_type: &str, data: &[u8]) -> UploadRequest {
    UploadRequest {
        key: key.to_string(),
        content_type: content_type.to_string(),
        data: Bytes::copy_from_slice(data),
    }
}

/// Store whose every operation fails with a backend error
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn write(
        &self,
        _ctx: &CallContext,
        _key: &str,
        _content_type: &str,
        _data: Bytes,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("bucket unavailable".into()))
    }

    async fn delete(&self, _ctx: &CallContext, key: &str) -> Result<(), StoreError> {
        Err(StoreError::NotFound(key.to_string()))
    }

    async fn read(&self, _ctx: &CallContext, key: &str) -> Result<StoredObject, StoreError> {
        Err(StoreError::NotFound(key.to_string()))
    }
}
