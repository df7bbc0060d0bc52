//! src/services/ad_service.rs
//!
//! AdManager composes the ad store, photo store, object uploader and image
//! processor into the operations exposed over HTTP.
//!
//! Photo uploads run strictly in sequence: bytes to object storage, then the
//! photo row, then the downstream processing call. Nothing is retried. With
//! the default [`CleanupPolicy::Preserve`] a failure after the upload leaves
//! what was already written in place; [`CleanupPolicy::Strict`] removes it.

use super::{
    ad_store::{AdStore, StoreError},
    image_processor::{ImageProcessor, ProcessorError},
    object_uploader::{ObjectUploader, ObjectWriter, UploadError, UploadResult},
    photo_store::PhotoStore,
};
use crate::models::{ad::Ad, photo::Photo};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing fields")]
    MissingFields,
    #[error("not found")]
    NotFound,
    #[allow(dead_code)]
    #[error("already exists")]
    AlreadyExists,
    #[allow(dead_code)]
    #[error("inconsistent IDs")]
    InconsistentIds,
    #[error("expected URL variable is missing")]
    BadRouting,
    #[error("upload failed")]
    Upload(#[source] UploadError),
    /// The processor answered with a non-`Ok` status.
    #[error("{0}")]
    Processing(String),
    #[error("image processor unavailable")]
    ProcessorUnavailable(#[source] ProcessorError),
    #[error("database error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingAd(_) => ServiceError::NotFound,
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Fallback message when the processor rejects a photo without saying why.
const PROCESSING_FAILED: &str = "image processing failed";

/// A photo body as it arrives from the client.
pub struct PhotoUpload<'a> {
    pub content_type: Option<String>,
    pub body: BoxStream<'a, io::Result<Bytes>>,
}

/// What happens to side effects that were already committed when a later
/// step of a photo upload fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Leave the stored object and photo row in place.
    #[default]
    Preserve,
    /// Delete the orphaned object and photo row, best-effort.
    Strict,
}

#[derive(Clone, Debug)]
pub struct ServiceOptions {
    /// Bound on opening, streaming and committing an upload.
    pub upload_timeout: Duration,
    /// Reject ads without a non-zero price.
    pub require_price: bool,
    pub cleanup: CleanupPolicy,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(50),
            require_price: false,
            cleanup: CleanupPolicy::Preserve,
        }
    }
}

#[async_trait]
pub trait AdService: Send + Sync {
    /// Create an ad and return its new identifier.
    async fn post_ad(&self, ad: Ad) -> ServiceResult<i64>;

    /// Update an existing ad. The owning user can never be changed.
    async fn put_ad(&self, ad: Ad) -> ServiceResult<()>;

    async fn delete_ad(&self, id: i64) -> ServiceResult<()>;

    /// Store a photo for `ad_id` and hand it to the image processor.
    async fn post_photo<'a>(
        &self,
        ad_id: i64,
        upload: PhotoUpload<'a>,
        request_id: &str,
    ) -> ServiceResult<Photo>;

    /// Delete photo `id` of ad `ad_id`. The stored object is kept.
    async fn delete_photo(&self, ad_id: i64, id: i64) -> ServiceResult<()>;
}

pub struct AdManager {
    ads: Arc<dyn AdStore>,
    photos: Arc<dyn PhotoStore>,
    uploader: Arc<dyn ObjectUploader>,
    processor: Arc<dyn ImageProcessor>,
    options: ServiceOptions,
    key_seq: AtomicU64,
}

impl AdManager {
    pub fn new(
        ads: Arc<dyn AdStore>,
        photos: Arc<dyn PhotoStore>,
        uploader: Arc<dyn ObjectUploader>,
        processor: Arc<dyn ImageProcessor>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            ads,
            photos,
            uploader,
            processor,
            options,
            key_seq: AtomicU64::new(0),
        }
    }

    /// Storage key `{ad_id}-{unix_nanos}-{seq}`.
    ///
    /// The sequence number keeps keys distinct when two uploads for the same
    /// ad land on the same clock reading.
    fn next_object_key(&self, ad_id: i64) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = self.key_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", ad_id, nanos, seq)
    }

    /// Stream `upload` into a new object under `key`.
    ///
    /// The whole exchange is bounded by the upload timeout. On any failure the
    /// writer is aborted before returning.
    async fn upload(&self, key: &str, upload: PhotoUpload<'_>) -> UploadResult<u64> {
        let limit = self.options.upload_timeout;
        let PhotoUpload { content_type, body } = upload;
        let mut writer: Option<Box<dyn ObjectWriter>> = None;

        let result = tokio::time::timeout(limit, async {
            let writer = writer.insert(self.uploader.open(key, content_type.as_deref()).await?);
            copy_into(writer.as_mut(), body).await?;
            writer.finish().await
        })
        .await
        .unwrap_or(Err(UploadError::TimedOut(limit)));

        if result.is_err() {
            if let Some(mut writer) = writer {
                writer.abort().await;
            }
        }
        result
    }

    async fn discard_object(&self, key: &str) {
        match self.uploader.delete(key).await {
            Ok(()) => info!(key = %key, "removed orphaned object"),
            Err(err) => warn!(key = %key, "failed to remove orphaned object: {}", err),
        }
    }

    async fn discard_photo(&self, photo: &Photo, key: &str) {
        match self.photos.delete(photo.ad_id, photo.id).await {
            Ok(_) => info!(photo_id = photo.id, "removed unprocessed photo row"),
            Err(err) => warn!(
                photo_id = photo.id,
                "failed to remove unprocessed photo row: {}", err
            ),
        }
        self.discard_object(key).await;
    }
}

#[async_trait]
impl AdService for AdManager {
    #[instrument(skip(self, ad), fields(user_id = %ad.user_id))]
    async fn post_ad(&self, mut ad: Ad) -> ServiceResult<i64> {
        info!(title = %ad.title, "PostAd request received");

        ad.id = 0;
        if ad.missing_required_fields() || (self.options.require_price && ad.missing_price()) {
            return Err(failed("PostAd", ServiceError::MissingFields));
        }

        let id = self
            .ads
            .create(&ad)
            .await
            .map_err(|err| failed("PostAd", err.into()))?;
        debug!(id, "ad created");
        Ok(id)
    }

    #[instrument(skip(self, ad), fields(id = ad.id))]
    async fn put_ad(&self, mut ad: Ad) -> ServiceResult<()> {
        info!("PutAd request received");

        ad.user_id.clear();
        if ad.id == 0 {
            return Err(failed("PutAd", ServiceError::MissingFields));
        }

        let rows = self
            .ads
            .update(&ad)
            .await
            .map_err(|err| failed("PutAd", err.into()))?;
        if rows == 0 {
            return Err(failed("PutAd", ServiceError::NotFound));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_ad(&self, id: i64) -> ServiceResult<()> {
        info!("DeleteAd request received");

        let rows = self
            .ads
            .delete(id)
            .await
            .map_err(|err| failed("DeleteAd", err.into()))?;
        if rows == 0 {
            return Err(failed("DeleteAd", ServiceError::NotFound));
        }
        Ok(())
    }

    #[instrument(skip(self, upload), fields(content_type = ?upload.content_type))]
    async fn post_photo<'a>(
        &self,
        ad_id: i64,
        upload: PhotoUpload<'a>,
        request_id: &str,
    ) -> ServiceResult<Photo> {
        info!("PostPhoto request received");

        if ad_id == 0 {
            return Err(failed("PostPhoto", ServiceError::MissingFields));
        }

        let key = self.next_object_key(ad_id);
        let url = self.uploader.object_url(&key);

        let size = self.upload(&key, upload).await.map_err(|err| {
            error!(key = %key, "upload failed: {}", err);
            failed("PostPhoto", ServiceError::Upload(err))
        })?;
        debug!(key = %key, size, "photo stored");

        let photo = match self.photos.create(ad_id, &url).await {
            Ok(photo) => photo,
            Err(err) => {
                match self.options.cleanup {
                    CleanupPolicy::Strict => self.discard_object(&key).await,
                    CleanupPolicy::Preserve => {
                        warn!(key = %key, "stored object has no photo row")
                    }
                }
                return Err(failed("PostPhoto", err.into()));
            }
        };

        let err = match self.processor.process(photo.id, request_id).await {
            Ok(outcome) if outcome.is_ok() => {
                info!(photo_id = photo.id, "photo processed");
                return Ok(photo);
            }
            Ok(outcome) => {
                error!(code = ?outcome.code, "received non-Ok processing status");
                let message = if outcome.message.is_empty() {
                    PROCESSING_FAILED.to_string()
                } else {
                    outcome.message
                };
                ServiceError::Processing(message)
            }
            Err(err) => {
                error!("image processor call failed: {}", err);
                ServiceError::ProcessorUnavailable(err)
            }
        };

        match self.options.cleanup {
            CleanupPolicy::Strict => self.discard_photo(&photo, &key).await,
            CleanupPolicy::Preserve => {
                warn!(photo_id = photo.id, "photo row kept without processing")
            }
        }
        Err(failed("PostPhoto", err))
    }

    #[instrument(skip(self))]
    async fn delete_photo(&self, ad_id: i64, id: i64) -> ServiceResult<()> {
        info!("DeletePhoto request received");

        let rows = self
            .photos
            .delete(ad_id, id)
            .await
            .map_err(|err| failed("DeletePhoto", err.into()))?;
        if rows == 0 {
            return Err(failed("DeletePhoto", ServiceError::NotFound));
        }
        Ok(())
    }
}

/// Log a failed operation and hand the error back.
fn failed(context: &str, err: ServiceError) -> ServiceError {
    error!(context, "{}", err);
    err
}

async fn copy_into(
    writer: &mut dyn ObjectWriter,
    mut body: BoxStream<'_, io::Result<Bytes>>,
) -> UploadResult<()> {
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(UploadError::Read)?;
        if !chunk.is_empty() {
            writer.write(chunk).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "ad_service_tests.rs"]
mod tests;
