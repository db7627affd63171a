//! S3-backed store
//!
//! | Operation | S3 call | Span |
//! |-----------|---------|------|
//! | write | PutObject | `s3.put_object` |
//! | delete | DeleteObject | `s3.delete_object` |
//! | read | GetObject | `s3.get_object` |

use super::{Store, StoreError, StoredObject};
use crate::upload::{CallContext, DEFAULT_CONTENT_TYPE};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

/// Store backed by a single S3 bucket
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Wrap a configured client; the store never configures it itself
    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn backend_error<E: std::error::Error>(err: E) -> StoreError {
    StoreError::Backend(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl Store for S3Store {
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, ctx, data),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %key,
            http.content_type = %content_type,
            upload.bytes = data.len(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn write(
        &self,
        ctx: &CallContext,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send();

        let output = ctx
            .run(request)
            .await
            .ok_or(StoreError::Cancelled)?
            .map_err(backend_error)?;

        if let Some(etag) = output.e_tag() {
            tracing::Span::current().record("s3.etag", etag);
        }
        tracing::info!("PutObject completed");
        Ok(())
    }

    #[tracing::instrument(
        name = "s3.delete_object",
        skip(self, ctx),
        fields(s3.bucket = %self.bucket, s3.key = %key),
        err
    )]
    async fn delete(&self, ctx: &CallContext, key: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send();

        ctx.run(request)
            .await
            .ok_or(StoreError::Cancelled)?
            .map_err(backend_error)?;

        tracing::info!("DeleteObject completed");
        Ok(())
    }

    #[tracing::instrument(
        name = "s3.get_object",
        skip(self, ctx),
        fields(s3.bucket = %self.bucket, s3.key = %key, download.bytes = tracing::field::Empty),
        err
    )]
    async fn read(&self, ctx: &CallContext, key: &str) -> Result<StoredObject, StoreError> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send();

        let output = match ctx.run(request).await.ok_or(StoreError::Cancelled)? {
            Ok(output) => output,
            Err(err) => {
                return Err(match err.into_service_error() {
                    GetObjectError::NoSuchKey(_) => StoreError::NotFound(key.to_string()),
                    other => backend_error(other),
                })
            }
        };

        let content_type = output
            .content_type()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = ctx
            .run(output.body.collect())
            .await
            .ok_or(StoreError::Cancelled)?
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .into_bytes();

        tracing::Span::current().record("download.bytes", data.len());

        Ok(StoredObject {
            key: key.to_string(),
            content_type,
            data,
        })
    }
}
