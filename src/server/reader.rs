//! Reader role: `Get`

use crate::metrics;
use crate::pb::image_service_reader_server::{ImageServiceReader, ImageServiceReaderServer};
use crate::pb::{GetRequest, GetResponse};
use crate::storage::{Store, StoreError};
use crate::upload::CallContext;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

/// gRPC adapter for the read side; a plain get-by-key passthrough
#[derive(Clone)]
pub struct ReaderService {
    store: Arc<dyn Store>,
    context: CallContext,
}

impl std::fmt::Debug for ReaderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderService")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl ReaderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_context(store, CallContext::background())
    }

    pub fn with_context(store: Arc<dyn Store>, context: CallContext) -> Self {
        Self { store, context }
    }

    /// Wrap in the generated tonic service
    pub fn into_server(self) -> ImageServiceReaderServer<Self> {
        ImageServiceReaderServer::new(self)
    }
}

#[tonic::async_trait]
impl ImageServiceReader for ReaderService {
    #[tracing::instrument(
        name = "image.get",
        skip(self, request),
        fields(image.key = %request.get_ref().key),
        err
    )]
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let key = request.into_inner().key;
        let start_time = Instant::now();

        let result = if self.context.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            self.context
                .run(self.store.read(&self.context, &key))
                .await
                .unwrap_or(Err(StoreError::Cancelled))
        };
        metrics::record_operation_duration("read", start_time.elapsed().as_secs_f64());
        metrics::record_read(result.is_ok());

        let object = result?;
        Ok(Response::new(GetResponse {
            key: object.key,
            content_type: object.content_type,
            data: object.data,
        }))
    }
}
