//! Upload module
//!
//! Server side of the streaming upload: chunk accumulation, validation and
//! hand-off to a [`Store`](crate::storage::Store).

use crate::storage::StoreError;
use bytes::{Bytes, BytesMut};
use thiserror::Error;

pub mod collector;
pub mod content_type;
pub mod context;

pub use collector::UploadCollector;
pub use content_type::{content_type_from, DEFAULT_CONTENT_TYPE};
pub use context::{CallContext, CancelHandle};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("key cannot be empty")]
    NoKey,

    #[error("content_type cannot be empty")]
    NoContentType,

    #[error("transport error: {}", .0.message())]
    Transport(tonic::Status),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("call cancelled")]
    Cancelled,
}

impl UploadError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoKey => "no_key",
            Self::NoContentType => "no_content_type",
            Self::Transport(_) => "transport",
            Self::Store(_) => "store",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Store(other),
        }
    }
}

impl From<tonic::Status> for UploadError {
    fn from(status: tonic::Status) -> Self {
        Self::Transport(status)
    }
}

/// One message of an upload stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
}

impl From<crate::pb::UploadRequest> for Chunk {
    fn from(msg: crate::pb::UploadRequest) -> Self {
        Self {
            key: msg.key,
            content_type: msg.content_type,
            data: msg.data,
        }
    }
}

/// Terminal status reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

/// Delivers the terminal [`Outcome`] of an upload to the client.
///
/// A sink accepts at most one outcome; the call ends after it.
#[async_trait::async_trait]
pub trait ResponseSink: Send {
    async fn send_and_close(&mut self, outcome: Outcome) -> Result<(), tonic::Status>;
}

/// Everything received so far on one upload call.
///
/// `key` and `content_type` latch on the first chunk that sets them; the
/// buffer only grows.
#[derive(Debug, Default)]
pub struct AccumulatedUpload {
    key: String,
    content_type: String,
    buffer: BytesMut,
    chunks: usize,
}

impl AccumulatedUpload {
    /// Fold the next chunk into the upload
    pub fn absorb(&mut self, chunk: Chunk) {
        if self.key.is_empty() {
            self.key = chunk.key;
        }
        if self.content_type.is_empty() {
            self.content_type = content_type_from(&chunk.content_type);
        }
        self.buffer.extend_from_slice(&chunk.data);
        self.chunks += 1;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of chunks absorbed
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Check required fields. The key is checked before the content type.
    pub fn validate(self) -> Result<ValidatedUpload, UploadError> {
        if self.key.is_empty() {
            return Err(UploadError::NoKey);
        }
        if self.content_type.is_empty() {
            return Err(UploadError::NoContentType);
        }
        Ok(ValidatedUpload {
            key: self.key,
            content_type: self.content_type,
            data: self.buffer.freeze(),
            chunks: self.chunks,
        })
    }
}

/// A fully received upload with both required fields present
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
    pub chunks: usize,
}

/// Upload result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub key: String,
    pub content_type: String,
    pub bytes_written: u64,
    pub chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(key: &str, content_type: &str, data: &'static [u8]) -> Chunk {
        Chunk {
            key: key.into(),
            content_type: content_type.into(),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_key_latches_on_first_non_empty() {
        let mut upload = AccumulatedUpload::default();
        upload.absorb(chunk("", "image/png", b"a"));
        upload.absorb(chunk("", "", b"b"));
        upload.absorb(chunk("img-2", "", b"c"));
        upload.absorb(chunk("img-3", "", b"d"));
        assert_eq!(upload.key(), "img-2");
    }

    #[test]
    fn test_content_type_latches_on_first_chunk_resolution() {
        let mut upload = AccumulatedUpload::default();
        upload.absorb(chunk("k", "image/jpg", b"a"));
        upload.absorb(chunk("k", "image/png", b"b"));
        assert_eq!(upload.content_type(), "image/jpeg");

        // An empty hint still resolves to the fallback, which then sticks.
        let mut upload = AccumulatedUpload::default();
        upload.absorb(chunk("k", "", b"a"));
        upload.absorb(chunk("k", "image/png", b"b"));
        assert_eq!(upload.content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_buffer_concatenates_in_order() {
        let mut upload = AccumulatedUpload::default();
        upload.absorb(chunk("k", "image/gif", b"GIF8"));
        upload.absorb(chunk("", "", b""));
        upload.absorb(chunk("", "", b"9a"));
        assert_eq!(upload.len(), 6);
        assert_eq!(upload.chunks(), 3);

        let validated = upload.validate().unwrap();
        assert_eq!(&validated.data[..], b"GIF89a");
    }

    #[test]
    fn test_validate_checks_key_first() {
        let err = AccumulatedUpload::default().validate().unwrap_err();
        assert!(matches!(err, UploadError::NoKey));
    }

    #[test]
    fn test_validate_reports_missing_content_type() {
        let upload = AccumulatedUpload {
            key: "k".into(),
            ..Default::default()
        };
        assert!(matches!(
            upload.validate().unwrap_err(),
            UploadError::NoContentType
        ));
    }

    #[test]
    fn test_store_cancellation_becomes_upload_cancellation() {
        assert!(matches!(
            UploadError::from(StoreError::Cancelled),
            UploadError::Cancelled
        ));
        assert!(matches!(
            UploadError::from(StoreError::Backend("boom".into())),
            UploadError::Store(_)
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(UploadError::NoKey.to_string(), "key cannot be empty");
        assert_eq!(
            UploadError::NoContentType.to_string(),
            "content_type cannot be empty"
        );
    }
}
