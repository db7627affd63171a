//! Storage module
//!
//! The [`Store`] trait is the only way the rest of the crate touches the
//! object backend. Two implementations ship with the crate:
//!
//! - [`S3Store`] - any S3-compatible bucket via `aws-sdk-s3`
//! - [`MemoryStore`] - process-local map for development and tests

use crate::config::{StorageBackend, StorageConfig};
use crate::upload::CallContext;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod s3;

pub use self::memory::MemoryStore;
pub use self::s3::S3Store;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// An object as held by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Object backend capabilities
///
/// Writes replace any existing object at `key` and are all-or-nothing.
/// Deleting a key that does not exist succeeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist `data` under `key` tagged with `content_type`
    async fn write(
        &self,
        ctx: &CallContext,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StoreError>;

    /// Remove the object at `key`
    async fn delete(&self, ctx: &CallContext, key: &str) -> Result<(), StoreError>;

    /// Fetch the object at `key`
    async fn read(&self, ctx: &CallContext, key: &str) -> Result<StoredObject, StoreError>;
}

/// Store whose calls never complete on their own
#[cfg(test)]
#[derive(Default)]
pub(crate) struct StalledStore {
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StalledStore {
    async fn stall<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        std::future::pending().await
    }
}

#[cfg(test)]
#[async_trait]
impl Store for StalledStore {
    async fn write(&self, _: &CallContext, _: &str, _: &str, _: Bytes) -> Result<(), StoreError> {
        self.stall().await
    }

    async fn delete(&self, _: &CallContext, _: &str) -> Result<(), StoreError> {
        self.stall().await
    }

    async fn read(&self, _: &CallContext, _: &str) -> Result<StoredObject, StoreError> {
        self.stall().await
    }
}

/// Build the configured store
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store: objects are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| StoreError::Backend("missing s3 configuration".into()))?;
            let client = crate::s3::build_client(s3)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            tracing::info!(bucket = %s3.bucket, region = %s3.region, "Using S3 store");
            Ok(Arc::new(S3Store::new(client, &s3.bucket)))
        }
    }
}
