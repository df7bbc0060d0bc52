//! Client for the downstream image processing service.

use crate::proto::{Image, StatusCode, image_processor_service_client::ImageProcessorServiceClient};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tonic::{
    Request,
    metadata::{Ascii, MetadataValue},
    transport::{Channel, Endpoint},
};
use tracing::{debug, instrument};

/// Metadata key carrying the correlation id on outgoing calls.
pub const REQUEST_ID_METADATA: &str = "request-id";

/// What the processor said about a photo. Non-`Ok` codes are business
/// failures, not transport errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    pub code: StatusCode,
    pub message: String,
}

impl ProcessingOutcome {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// The processor could not be asked at all.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("invalid image processor address `{0}`")]
    InvalidAddress(String),
    #[error("photo id {0} does not fit the wire format")]
    IdOutOfRange(i64),
    #[error("request id `{0}` is not valid gRPC metadata")]
    InvalidRequestId(String),
    #[error("image processor call failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("image processor did not answer within {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Ask the processor to handle photo `photo_id`, tagging the call with
    /// `request_id` for tracing across services.
    async fn process(
        &self,
        photo_id: i64,
        request_id: &str,
    ) -> Result<ProcessingOutcome, ProcessorError>;
}

/// gRPC implementation over a shared, lazily connected channel.
#[derive(Clone)]
pub struct GrpcImageProcessor {
    client: ImageProcessorServiceClient<Channel>,
    timeout: Duration,
}

impl GrpcImageProcessor {
    /// Create the client without dialing; the first call establishes the
    /// connection.
    pub fn connect_lazy(url: &str, timeout: Duration) -> Result<Self, ProcessorError> {
        let channel = Endpoint::from_shared(url.to_string())
            .map_err(|_| ProcessorError::InvalidAddress(url.to_string()))?
            .connect_timeout(timeout)
            .connect_lazy();

        Ok(Self {
            client: ImageProcessorServiceClient::new(channel),
            timeout,
        })
    }
}

#[async_trait]
impl ImageProcessor for GrpcImageProcessor {
    #[instrument(skip(self), fields(timeout = ?self.timeout))]
    async fn process(
        &self,
        photo_id: i64,
        request_id: &str,
    ) -> Result<ProcessingOutcome, ProcessorError> {
        let id = u32::try_from(photo_id).map_err(|_| ProcessorError::IdOutOfRange(photo_id))?;
        let mut request = Request::new(Image { id });
        let value: MetadataValue<Ascii> = request_id
            .parse()
            .map_err(|_| ProcessorError::InvalidRequestId(request_id.to_string()))?;
        request.metadata_mut().insert(REQUEST_ID_METADATA, value);

        let mut client = self.client.clone();
        let response = tokio::time::timeout(self.timeout, client.process(request))
            .await
            .map_err(|_| ProcessorError::TimedOut(self.timeout))??
            .into_inner();

        debug!(code = response.code, "image processor answered");
        Ok(decode_status(response.code, response.message))
    }
}

/// Codes this client does not know are treated as failures.
fn decode_status(code: i32, message: String) -> ProcessingOutcome {
    ProcessingOutcome {
        code: StatusCode::try_from(code).unwrap_or(StatusCode::Error),
        message,
    }
}
