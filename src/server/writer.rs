//! Writer role: `Upload` and `Delete`

use super::with_response;
use crate::metrics;
use crate::pb::image_service_writer_server::{ImageServiceWriter, ImageServiceWriterServer};
use crate::pb::{DeleteRequest, DeleteResponse, UploadRequest, UploadResponse, UploadStatus};
use crate::storage::{Store, StoreError};
use crate::upload::{CallContext, Chunk, Outcome, ResponseSink, UploadCollector};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status, Streaming};

/// gRPC adapter for the write side
#[derive(Clone)]
pub struct WriterService {
    store: Arc<dyn Store>,
    collector: UploadCollector,
    context: CallContext,
}

impl std::fmt::Debug for WriterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterService")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl WriterService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_context(store, CallContext::background())
    }

    /// Every call runs under `context`
    pub fn with_context(store: Arc<dyn Store>, context: CallContext) -> Self {
        Self {
            collector: UploadCollector::new(store.clone()),
            store,
            context,
        }
    }

    /// Wrap in the generated tonic service
    pub fn into_server(self, max_message_bytes: usize) -> ImageServiceWriterServer<Self> {
        ImageServiceWriterServer::new(self).max_decoding_message_size(max_message_bytes)
    }
}

/// Holds the single response an upload may send
///
/// tonic writes the response only after the handler returns, so a send here
/// can fail only through cancellation and never reports a wire failure.
#[derive(Debug)]
struct ResponseSlot {
    context: CallContext,
    response: Option<UploadResponse>,
}

impl ResponseSlot {
    fn new(context: CallContext) -> Self {
        Self {
            context,
            response: None,
        }
    }
}

#[async_trait::async_trait]
impl ResponseSink for ResponseSlot {
    async fn send_and_close(&mut self, outcome: Outcome) -> Result<(), Status> {
        if self.context.is_cancelled() {
            return Err(Status::cancelled("call cancelled before the response was sent"));
        }
        if self.response.is_some() {
            return Err(Status::failed_precondition("upload response already sent"));
        }

        let mut response = UploadResponse::default();
        response.set_upload_status(match outcome {
            Outcome::Success => UploadStatus::Success,
            Outcome::Error => UploadStatus::Error,
        });
        self.response = Some(response);
        Ok(())
    }
}

#[tonic::async_trait]
impl ImageServiceWriter for WriterService {
    async fn upload(
        &self,
        request: Request<Streaming<UploadRequest>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let chunks = request.into_inner().map(|msg| msg.map(Chunk::from));
        let mut slot = ResponseSlot::new(self.context.clone());

        let result = self.collector.run(&self.context, chunks, &mut slot).await;

        match (result, slot.response) {
            (Ok(_), Some(response)) => Ok(Response::new(response)),
            (Ok(_), None) => Err(Status::internal("upload finished without a response")),
            (Err(err), sent) => {
                let status = Status::from(err);
                Err(match sent {
                    Some(response) => with_response(status, &response),
                    None => status,
                })
            }
        }
    }

    #[tracing::instrument(
        name = "image.delete",
        skip(self, request),
        fields(image.key = %request.get_ref().key),
        err
    )]
    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let key = request.into_inner().key;
        let start_time = Instant::now();

        let result = if self.context.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            self.context
                .run(self.store.delete(&self.context, &key))
                .await
                .unwrap_or(Err(StoreError::Cancelled))
        };
        metrics::record_operation_duration("delete", start_time.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::record_delete(true);
                tracing::info!("Delete completed");
                Ok(Response::new(DeleteResponse { ok: true }))
            }
            Err(err) => {
                metrics::record_delete(false);
                Err(with_response(
                    Status::from(err),
                    &DeleteResponse { ok: false },
                ))
            }
        }
    }
}
