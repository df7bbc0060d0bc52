//! In-memory fakes of the service's collaborators, for tests.

use crate::{
    database,
    models::{ad::Ad, photo::Photo},
    services::{
        ad_store::{AdStore, StoreError, StoreResult},
        image_processor::{ImageProcessor, ProcessingOutcome, ProcessorError},
        object_uploader::{
            ObjectUploader, ObjectWriter, UploadError, UploadResult, join_url,
        },
        photo_store::PhotoStore,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
};

pub const TEST_BUCKET: &str = "test-bucket";
pub const TEST_BASE_URL: &str = "https://objects.test";

/// A single-connection in-memory SQLite pool with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    database::run_migrations(&pool).await.unwrap();
    pool
}

/// A photo body made of the given chunks.
pub fn body_from(chunks: &[&'static [u8]]) -> BoxStream<'static, io::Result<Bytes>> {
    let chunks: Vec<io::Result<Bytes>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::from_static(chunk)))
        .collect();
    futures::stream::iter(chunks).boxed()
}

#[derive(Default)]
pub struct MemoryAdStore {
    rows: Mutex<BTreeMap<i64, Ad>>,
    mutations: Mutex<usize>,
}

impl MemoryAdStore {
    pub fn get(&self, id: i64) -> Option<Ad> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Number of create/update/delete calls that reached the store.
    pub fn mutations(&self) -> usize {
        *self.mutations.lock().unwrap()
    }

    fn touch(&self) {
        *self.mutations.lock().unwrap() += 1;
    }
}

#[async_trait]
impl AdStore for MemoryAdStore {
    async fn create(&self, ad: &Ad) -> StoreResult<i64> {
        self.touch();
        let mut rows = self.rows.lock().unwrap();
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        let now = Utc::now();
        rows.insert(
            id,
            Ad {
                id,
                created_at: Some(now),
                updated_at: Some(now),
                ..ad.clone()
            },
        );
        Ok(id)
    }

    async fn update(&self, ad: &Ad) -> StoreResult<u64> {
        self.touch();
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(&ad.id) else {
            return Ok(0);
        };
        if !ad.title.is_empty() {
            row.title = ad.title.clone();
        }
        if !ad.description.is_empty() {
            row.description = ad.description.clone();
        }
        if ad.price.is_some() {
            row.price = ad.price;
        }
        row.updated_at = Some(Utc::now());
        Ok(1)
    }

    async fn delete(&self, id: i64) -> StoreResult<u64> {
        self.touch();
        Ok(self.rows.lock().unwrap().remove(&id).map_or(0, |_| 1))
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Ad>> {
        Ok(self.get(id))
    }
}

pub struct MemoryPhotoStore {
    ads: Arc<MemoryAdStore>,
    rows: Mutex<BTreeMap<i64, Photo>>,
    fail_create: Mutex<bool>,
}

impl MemoryPhotoStore {
    /// Photos may only reference ads present in `ads`.
    pub fn new(ads: Arc<MemoryAdStore>) -> Self {
        Self {
            ads,
            rows: Mutex::new(BTreeMap::new()),
            fail_create: Mutex::new(false),
        }
    }

    /// Make every following `create` fail with a database error.
    pub fn fail_creates(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    pub fn all(&self) -> Vec<Photo> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn create(&self, ad_id: i64, url_original: &str) -> StoreResult<Photo> {
        if *self.fail_create.lock().unwrap() {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        if self.ads.get(ad_id).is_none() {
            return Err(StoreError::MissingAd(ad_id));
        }
        let mut rows = self.rows.lock().unwrap();
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        let photo = Photo {
            id,
            ad_id,
            url_original: url_original.to_string(),
            created_at: Utc::now(),
        };
        rows.insert(id, photo.clone());
        Ok(photo)
    }

    async fn delete(&self, ad_id: i64, id: i64) -> StoreResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&id) {
            Some(photo) if photo.ad_id == ad_id => {
                rows.remove(&id);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Photo>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }
}

/// Where a [`MemoryUploader`] should fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailAt {
    Open,
    Write,
    Finish,
}

#[derive(Default)]
struct UploaderState {
    objects: BTreeMap<String, Vec<u8>>,
    fail_at: Option<FailAt>,
    opened: usize,
    aborted: usize,
    deleted: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryUploader {
    state: Arc<Mutex<UploaderState>>,
}

impl MemoryUploader {
    pub fn fail_at(&self, stage: FailAt) {
        self.state.lock().unwrap().fail_at = Some(stage);
    }

    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.state.lock().unwrap().objects.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn aborted(&self) -> usize {
        self.state.lock().unwrap().aborted
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn failing(&self, stage: FailAt) -> bool {
        self.state.lock().unwrap().fail_at == Some(stage)
    }
}

#[async_trait]
impl ObjectUploader for MemoryUploader {
    fn object_url(&self, key: &str) -> String {
        join_url(TEST_BASE_URL, TEST_BUCKET, key)
    }

    async fn open(
        &self,
        key: &str,
        _content_type: Option<&str>,
    ) -> UploadResult<Box<dyn ObjectWriter>> {
        if self.failing(FailAt::Open) {
            return Err(UploadError::Open {
                key: key.to_string(),
                reason: "bucket unavailable".into(),
            });
        }
        self.state.lock().unwrap().opened += 1;
        Ok(Box::new(MemoryWriter {
            uploader: self.clone(),
            key: key.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn delete(&self, key: &str) -> UploadResult<()> {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(key);
        state.deleted.push(key.to_string());
        Ok(())
    }
}

struct MemoryWriter {
    uploader: MemoryUploader,
    key: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, chunk: Bytes) -> UploadResult<()> {
        if self.uploader.failing(FailAt::Write) {
            return Err(UploadError::Transfer {
                key: self.key.clone(),
                reason: "connection reset".into(),
            });
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> UploadResult<u64> {
        if self.uploader.failing(FailAt::Finish) {
            return Err(UploadError::Finalize {
                key: self.key.clone(),
                reason: "commit rejected".into(),
            });
        }
        let size = self.buffer.len() as u64;
        self.uploader
            .state
            .lock()
            .unwrap()
            .objects
            .insert(self.key.clone(), std::mem::take(&mut self.buffer));
        Ok(size)
    }

    async fn abort(&mut self) {
        self.buffer.clear();
        self.uploader.state.lock().unwrap().aborted += 1;
    }
}

/// How a [`StubProcessor`] answers.
#[derive(Clone, Debug)]
pub enum Answer {
    Outcome(ProcessingOutcome),
    Unreachable,
}

pub struct StubProcessor {
    answer: Mutex<Answer>,
    calls: Mutex<Vec<(i64, String)>>,
}

impl StubProcessor {
    pub fn answering(answer: Answer) -> Self {
        Self {
            answer: Mutex::new(answer),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::answering(Answer::Outcome(ProcessingOutcome::ok()))
    }

    /// Photo ids and request ids of every call received.
    pub fn calls(&self) -> Vec<(i64, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProcessor for StubProcessor {
    async fn process(
        &self,
        photo_id: i64,
        request_id: &str,
    ) -> Result<ProcessingOutcome, ProcessorError> {
        self.calls
            .lock()
            .unwrap()
            .push((photo_id, request_id.to_string()));
        match self.answer.lock().unwrap().clone() {
            Answer::Outcome(outcome) => Ok(outcome),
            Answer::Unreachable => Err(ProcessorError::Rpc(tonic::Status::unavailable(
                "connection refused",
            ))),
        }
    }
}
