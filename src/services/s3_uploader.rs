//! S3-compatible object storage backend.
//!
//! Bytes are buffered into parts of [`PART_SIZE`]. An object that never fills
//! a part is sent with a single `PutObject` when the writer finishes; larger
//! objects switch to a multipart upload on the first full part.

use super::object_uploader::{
    ObjectUploader, ObjectWriter, UploadError, UploadResult, join_url,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client,
    config::Builder as S3ConfigBuilder,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

/// S3 requires every part except the last to be at least 5 MiB.
pub const PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub public_base_url: String,
}

#[derive(Clone)]
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3Uploader {
    /// Build a client from the ambient AWS configuration plus `settings`.
    pub async fn new(settings: &S3Settings) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);
        if let Some(endpoint_url) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        info!(
            bucket = %settings.bucket,
            region = %settings.region,
            "S3 uploader initialized"
        );

        Self {
            client: S3Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            public_base_url: settings.public_base_url.clone(),
        }
    }
}

#[async_trait]
impl ObjectUploader for S3Uploader {
    fn object_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, &self.bucket, key)
    }

    async fn open(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> UploadResult<Box<dyn ObjectWriter>> {
        if key.is_empty() {
            return Err(UploadError::Open {
                key: key.to_string(),
                reason: "empty object key".into(),
            });
        }

        Ok(Box::new(S3Writer {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type
                .unwrap_or("application/octet-stream")
                .to_string(),
            buffer: BytesMut::new(),
            upload_id: None,
            parts: Vec::new(),
            written: 0,
        }))
    }

    async fn delete(&self, key: &str) -> UploadResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| UploadError::Delete {
                key: key.to_string(),
                reason: DisplayErrorContext(&err).to_string(),
            })?;

        debug!(key = %key, "object deleted");
        Ok(())
    }
}

struct S3Writer {
    client: S3Client,
    bucket: String,
    key: String,
    content_type: String,
    buffer: BytesMut,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    written: u64,
}

impl S3Writer {
    fn transfer_err(&self, reason: String) -> UploadError {
        UploadError::Transfer {
            key: self.key.clone(),
            reason,
        }
    }

    fn finalize_err(&self, reason: String) -> UploadError {
        UploadError::Finalize {
            key: self.key.clone(),
            reason,
        }
    }

    async fn ensure_multipart(&mut self) -> UploadResult<String> {
        if let Some(upload_id) = &self.upload_id {
            return Ok(upload_id.clone());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .send()
            .await
            .map_err(|err| self.transfer_err(DisplayErrorContext(&err).to_string()))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| self.transfer_err("no upload id in response".into()))?
            .to_string();
        debug!(key = %self.key, upload_id = %upload_id, "multipart upload started");
        self.upload_id = Some(upload_id.clone());
        Ok(upload_id)
    }

    async fn send_part(&mut self, body: Bytes) -> Result<(), String> {
        let upload_id = self
            .ensure_multipart()
            .await
            .map_err(|err| err.to_string())?;
        let part_number = self.parts.len() as i32 + 1;

        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| DisplayErrorContext(&err).to_string())?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(uploaded.e_tag().unwrap_or_default())
                .build(),
        );
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for S3Writer {
    async fn write(&mut self, chunk: Bytes) -> UploadResult<()> {
        self.written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        while self.buffer.len() >= PART_SIZE {
            let part = self.buffer.split_to(PART_SIZE).freeze();
            self.send_part(part)
                .await
                .map_err(|reason| self.transfer_err(reason))?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> UploadResult<u64> {
        let tail = self.buffer.split().freeze();

        if self.upload_id.is_none() {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .content_type(&self.content_type)
                .body(ByteStream::from(tail))
                .send()
                .await
                .map_err(|err| self.finalize_err(DisplayErrorContext(&err).to_string()))?;
            return Ok(self.written);
        }

        if !tail.is_empty() {
            self.send_part(tail)
                .await
                .map_err(|reason| self.finalize_err(reason))?;
        }

        let upload_id = self.upload_id.clone().unwrap_or_default();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(self.parts.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| self.finalize_err(DisplayErrorContext(&err).to_string()))?;

        self.upload_id = None;
        Ok(self.written)
    }

    async fn abort(&mut self) {
        self.buffer.clear();
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };

        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .send()
            .await
        {
            warn!(
                key = %self.key,
                upload_id = %upload_id,
                "failed to abort multipart upload: {}",
                DisplayErrorContext(&err)
            );
        }
    }
}
