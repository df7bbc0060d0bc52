//! Local filesystem object storage, used for development and tests.
//!
//! Objects live under `base_path/{bucket}/{shard}/{shard}/{key}`. Bytes are
//! streamed into a temporary file beside the destination and renamed into
//! place on finish, so readers never observe a partial object.

use super::object_uploader::{
    ObjectUploader, ObjectWriter, UploadError, UploadResult, join_url,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct DiskUploader {
    base_path: PathBuf,
    bucket: String,
    public_base_url: String,
}

impl DiskUploader {
    pub fn new(
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Rejects keys that could escape the bucket directory.
    fn ensure_key_safe(key: &str) -> Result<(), String> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err("invalid object key length".into());
        }
        if key.starts_with('/') || key.contains("..") {
            return Err("object key must be relative".into());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err("object key contains control characters".into());
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard directories from MD5(bucket/key), 00-ff each.
    fn object_shards(&self, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", self.bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = self.object_shards(key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Remove empty directories from `start` up to (not including) the bucket root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.bucket_root();
        let mut current = start.to_path_buf();
        while current.starts_with(&stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectUploader for DiskUploader {
    fn object_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, &self.bucket, key)
    }

    async fn open(
        &self,
        key: &str,
        _content_type: Option<&str>,
    ) -> UploadResult<Box<dyn ObjectWriter>> {
        let open_err = |reason: String| UploadError::Open {
            key: key.to_string(),
            reason,
        };

        Self::ensure_key_safe(key).map_err(open_err)?;
        let final_path = self.object_path(key);
        let parent = final_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| open_err("object path missing parent directory".into()))?;
        fs::create_dir_all(&parent)
            .await
            .map_err(|err| open_err(err.to_string()))?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = File::create(&tmp_path)
            .await
            .map_err(|err| open_err(err.to_string()))?;

        Ok(Box::new(DiskWriter {
            key: key.to_string(),
            file: Some(file),
            tmp_path,
            final_path,
            written: 0,
        }))
    }

    async fn delete(&self, key: &str) -> UploadResult<()> {
        let delete_err = |reason: String| UploadError::Delete {
            key: key.to_string(),
            reason,
        };

        Self::ensure_key_safe(key).map_err(delete_err)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed object file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("object file {} already missing", file_path.display());
            }
            Err(err) => return Err(delete_err(err.to_string())),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }
}

struct DiskWriter {
    key: String,
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl DiskWriter {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("writer already closed"))
    }

    async fn commit(&mut self) -> io::Result<()> {
        let file = self.file()?;
        file.flush().await?;
        file.sync_all().await?;
        self.file = None;

        if let Err(err) = fs::rename(&self.tmp_path, &self.final_path).await {
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(err);
            }
            fs::remove_file(&self.final_path).await?;
            fs::rename(&self.tmp_path, &self.final_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for DiskWriter {
    async fn write(&mut self, chunk: Bytes) -> UploadResult<()> {
        let result = match self.file() {
            Ok(file) => file.write_all(&chunk).await,
            Err(err) => Err(err),
        };
        result.map_err(|err| UploadError::Transfer {
            key: self.key.clone(),
            reason: err.to_string(),
        })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> UploadResult<u64> {
        self.commit().await.map_err(|err| UploadError::Finalize {
            key: self.key.clone(),
            reason: err.to_string(),
        })?;
        Ok(self.written)
    }

    async fn abort(&mut self) {
        self.file = None;
        if let Err(err) = fs::remove_file(&self.tmp_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove temp file {}: {}",
                    self.tmp_path.display(),
                    err
                );
            }
        }
    }
}
