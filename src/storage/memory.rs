//! In-memory store

use super::{Store, StoreError, StoredObject};
use crate::upload::CallContext;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local object map
///
/// Each write swaps in a whole [`StoredObject`] under the lock, so readers
/// never see a partial object.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Peek at an object without a call context
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write(
        &self,
        ctx: &CallContext,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let object = StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            data,
        };
        self.objects.write().insert(key.to_string(), object);
        Ok(())
    }

    async fn delete(&self, ctx: &CallContext, key: &str) -> Result<(), StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.objects.write().remove(key);
        Ok(())
    }

    async fn read(&self, ctx: &CallContext, key: &str) -> Result<StoredObject, StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
