//! Shared fixtures: stub embedder and fault-injecting collaborators.

#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use lostfound_core::{
    BlobError, BlobStore, EmbeddingAdapter, EmbeddingError, EmbeddingModel, IngestionPipeline,
    ItemId, ItemMetadata, ItemRecord, MemoryBlobStore, MemoryVectorStore, PreparedImage,
    SearchHit, SearchService, StatusTracker, StoreError, Submission, TopK, VectorStore,
};

pub const DIMENSION: usize = 8;

/// Deterministic embedder: every input maps to the same configured vector,
/// except text that contains a registered keyword.
pub struct StubModel {
    pub image_vector: Vec<f32>,
    pub keywords: Vec<(String, Vec<f32>)>,
    pub fallback: Vec<f32>,
    pub fail: AtomicBool,
    pub text_calls: AtomicUsize,
}

impl StubModel {
    pub fn constant(vector: Vec<f32>) -> Self {
        Self {
            image_vector: vector.clone(),
            keywords: Vec::new(),
            fallback: vector,
            fail: AtomicBool::new(false),
            text_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    fn dimension(&self) -> usize {
        self.image_vector.len()
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Inference("stub failure".to_string()));
        }
        Ok(self
            .keywords
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map(|(_, vector)| vector.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }

    async fn embed_image(&self, _image: &PreparedImage) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Inference("stub failure".to_string()));
        }
        Ok(self.image_vector.clone())
    }
}

/// Blob store whose puts can be made to fail.
pub struct FaultyBlobStore {
    pub inner: MemoryBlobStore,
    pub fail_put: AtomicBool,
}

impl FaultyBlobStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryBlobStore::new("/images"),
            fail_put: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BlobStore for FaultyBlobStore {
    async fn put(
        &self,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("bucket unavailable".to_string()));
        }
        self.inner.put(file_name, bytes, content_type).await
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        self.inner.get(url).await
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        self.inner.delete(url).await
    }
}

/// Vector store whose inserts can be made to fail.
pub struct FaultyVectorStore {
    pub inner: MemoryVectorStore,
    pub fail_insert: AtomicBool,
    pub searches: AtomicUsize,
}

impl FaultyVectorStore {
    pub fn new(dimension: usize, capacity: usize) -> Self {
        Self {
            inner: MemoryVectorStore::new(dimension, capacity),
            fail_insert: AtomicBool::new(false),
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorStore for FaultyVectorStore {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }

    async fn insert(
        &self,
        id: ItemId,
        vector: Vec<f32>,
        metadata: ItemMetadata,
    ) -> Result<(), StoreError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Snapshot("disk full".to_string()));
        }
        self.inner.insert(id, vector, metadata).await
    }

    async fn get(&self, id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        self.inner.get(id).await
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: TopK,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query, top_k, min_similarity).await
    }

    async fn delete(&self, id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        self.inner.delete(id).await
    }
}

/// Wired-up services over the fault-injecting collaborators.
pub struct Harness {
    pub model: Arc<StubModel>,
    pub store: Arc<FaultyVectorStore>,
    pub blobs: Arc<FaultyBlobStore>,
    pub status: Arc<StatusTracker>,
    pub pipeline: Arc<IngestionPipeline>,
    pub search: SearchService,
}

impl Harness {
    pub fn new(model: StubModel) -> Self {
        let model = Arc::new(model);
        let store = Arc::new(FaultyVectorStore::new(model.dimension(), 1_000));
        let blobs = Arc::new(FaultyBlobStore::new());
        let status = Arc::new(StatusTracker::new(Duration::from_secs(300), 150));
        let embedder = Arc::new(EmbeddingAdapter::with_model(model.clone(), 64));
        let pipeline = Arc::new(IngestionPipeline::new(
            embedder.clone(),
            store.clone(),
            blobs.clone(),
            status.clone(),
        ));
        let search = SearchService::new(embedder, store.clone(), blobs.clone());
        Self {
            model,
            store,
            blobs,
            status,
            pipeline,
            search,
        }
    }
}

/// Unit vector along `axis`.
pub fn axis(axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    vector[axis] = 1.0;
    vector
}

/// A small valid PNG.
pub fn png() -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([20, 40, 200])))
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("encode png");
    buffer.into_inner()
}

pub fn submission(title: &str, location: &str) -> Submission {
    Submission {
        title: title.to_string(),
        description: String::new(),
        location: location.to_string(),
        image: png(),
        content_type: Some("image/png".to_string()),
    }
}
