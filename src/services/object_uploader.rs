//! Object storage capability used by the photo pipeline.
//!
//! A writer is opened per object, fed chunks, then either finished or
//! aborted. Failures are classified so callers can tell "nothing was written"
//! (`Open`, `Read`, `Transfer` followed by an abort) from "the final commit
//! failed" (`Finalize`).

use async_trait::async_trait;
use bytes::Bytes;
use std::{io, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not open `{key}` for writing: {reason}")]
    Open { key: String, reason: String },
    #[error("reading the photo body failed: {0}")]
    Read(#[source] io::Error),
    #[error("writing `{key}` failed: {reason}")]
    Transfer { key: String, reason: String },
    #[error("finalizing `{key}` failed: {reason}")]
    Finalize { key: String, reason: String },
    #[error("upload did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("deleting `{key}` failed: {reason}")]
    Delete { key: String, reason: String },
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Streaming writer for a single object.
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> UploadResult<()>;

    /// Flush and commit the object. Returns the number of bytes written.
    async fn finish(&mut self) -> UploadResult<u64>;

    /// Discard whatever was written so far. Best-effort.
    async fn abort(&mut self);
}

#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Public URL the object will be reachable at once committed.
    fn object_url(&self, key: &str) -> String;

    async fn open(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> UploadResult<Box<dyn ObjectWriter>>;

    async fn delete(&self, key: &str) -> UploadResult<()>;
}

/// Join a public base URL, bucket and key into an object URL.
pub fn join_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}
