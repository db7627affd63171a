//! Upload Stream Collector
//!
//! Drives one upload call through
//! `Receiving -> Validating -> Committing -> Terminal`:
//!
//! 1. **Receiving**: pull chunks in arrival order until the stream ends,
//!    latching key/content type and appending data
//! 2. **Validating**: reject a missing key, then a missing content type
//! 3. **Committing**: a single [`Store::write`] of the whole buffer
//! 4. **Terminal**: report [`Outcome::Success`] or [`Outcome::Error`]
//!    through the [`ResponseSink`]
//!
//! Nothing reaches the store until the stream is fully drained, so a call
//! that fails or is cancelled mid-stream never leaves a partial object.

use super::{
    AccumulatedUpload, CallContext, Chunk, Outcome, ResponseSink, UploadError, UploadSummary,
    ValidatedUpload,
};
use crate::metrics;
use crate::storage::Store;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Instant;

/// Runs upload calls against a shared [`Store`]
#[derive(Clone)]
pub struct UploadCollector {
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for UploadCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCollector").finish_non_exhaustive()
    }
}

impl UploadCollector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run one upload call to its terminal state.
    ///
    /// On a failed write the `Error` outcome is sent first and the write
    /// error returned afterwards. If that send fails, the send error is
    /// returned and the write error is only logged.
    #[tracing::instrument(
        name = "upload.stream",
        skip_all,
        fields(
            image.key = tracing::field::Empty,
            image.content_type = tracing::field::Empty,
            upload.bytes = tracing::field::Empty,
            upload.chunks = tracing::field::Empty
        ),
        err
    )]
    pub async fn run<St, R>(
        &self,
        ctx: &CallContext,
        chunks: St,
        sink: &mut R,
    ) -> Result<UploadSummary, UploadError>
    where
        St: Stream<Item = Result<Chunk, tonic::Status>> + Unpin + Send,
        R: ResponseSink + ?Sized,
    {
        if ctx.is_cancelled() {
            metrics::record_error(UploadError::Cancelled.kind());
            return Err(UploadError::Cancelled);
        }

        let start_time = Instant::now();
        let upload = match receive(ctx, chunks).await.and_then(AccumulatedUpload::validate) {
            Ok(upload) => upload,
            Err(err) => {
                metrics::record_upload_failure();
                metrics::record_error(err.kind());
                return Err(err);
            }
        };

        let span = tracing::Span::current();
        span.record("image.key", upload.key.as_str());
        span.record("image.content_type", upload.content_type.as_str());
        span.record("upload.bytes", upload.data.len());
        span.record("upload.chunks", upload.chunks);

        let summary = UploadSummary {
            key: upload.key.clone(),
            content_type: upload.content_type.clone(),
            bytes_written: upload.data.len() as u64,
            chunks: upload.chunks,
        };

        let committed = self.commit(ctx, upload).await;
        metrics::record_operation_duration("upload", start_time.elapsed().as_secs_f64());

        match committed {
            Err(write_err) => {
                metrics::record_upload_failure();
                metrics::record_error(write_err.kind());
                if let Err(send_err) = sink.send_and_close(Outcome::Error).await {
                    // The send error wins; keep the write error in the logs.
                    tracing::error!(
                        error = %write_err,
                        send_error = %send_err.message(),
                        "Failed to report upload error to client"
                    );
                    metrics::record_error("transport");
                    return Err(UploadError::Transport(send_err));
                }
                Err(write_err)
            }
            Ok(()) => {
                if let Err(send_err) = sink.send_and_close(Outcome::Success).await {
                    metrics::record_upload_failure();
                    metrics::record_error("transport");
                    return Err(UploadError::Transport(send_err));
                }
                metrics::record_upload_success(summary.bytes_written, summary.chunks);
                tracing::info!(
                    bytes_written = summary.bytes_written,
                    duration_ms = start_time.elapsed().as_millis(),
                    "Upload completed"
                );
                Ok(summary)
            }
        }
    }

    /// Write a validated upload to the store
    async fn commit(&self, ctx: &CallContext, upload: ValidatedUpload) -> Result<(), UploadError> {
        if ctx.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let write = self
            .store
            .write(ctx, &upload.key, &upload.content_type, upload.data);
        ctx.run(write).await.ok_or(UploadError::Cancelled)??;
        Ok(())
    }
}

/// Drain `chunks` into an [`AccumulatedUpload`].
///
/// A stream error aborts immediately as [`UploadError::Transport`];
/// cancelling `ctx` while waiting aborts with [`UploadError::Cancelled`].
pub async fn receive<St>(ctx: &CallContext, mut chunks: St) -> Result<AccumulatedUpload, UploadError>
where
    St: Stream<Item = Result<Chunk, tonic::Status>> + Unpin,
{
    let mut upload = AccumulatedUpload::default();
    loop {
        match ctx.run(chunks.next()).await {
            None => return Err(UploadError::Cancelled),
            Some(None) => break,
            Some(Some(Ok(chunk))) => {
                tracing::trace!(bytes = chunk.data.len(), "Received chunk");
                upload.absorb(chunk);
            }
            Some(Some(Err(status))) => return Err(UploadError::Transport(status)),
        }
    }
    tracing::debug!(
        chunks = upload.chunks(),
        bytes = upload.len(),
        "Upload stream drained"
    );
    Ok(upload)
}
