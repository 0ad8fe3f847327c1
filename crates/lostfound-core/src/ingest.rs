//! Ingestion Pipeline: submission -> blob -> embedding -> record -> status.
//!
//! Each side effect registers a compensation in a [`Saga`]. When a later
//! step fails the saga unwinds, so a failed ingestion leaves neither a
//! record nor a blob behind.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    auth::Identity,
    blob::{blob_file_name, BlobStore},
    embedding::EmbeddingAdapter,
    error::{Error, Result},
    formats::ImageFormat,
    models::{IngestionState, ItemId, ItemMetadata, ItemRecord, Owner, Submission},
    saga::Saga,
    status::StatusTracker,
    store::VectorStore,
};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 4000;
pub const MAX_LOCATION_CHARS: usize = 200;

/// Default upper bound on image size.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Orchestrates found-item ingestion.
pub struct IngestionPipeline {
    embedder: Arc<EmbeddingAdapter>,
    store: Arc<dyn VectorStore>,
    blobs: Arc<dyn BlobStore>,
    status: Arc<StatusTracker>,
    max_image_bytes: usize,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<EmbeddingAdapter>,
        store: Arc<dyn VectorStore>,
        blobs: Arc<dyn BlobStore>,
        status: Arc<StatusTracker>,
    ) -> Self {
        Self {
            embedder,
            store,
            blobs,
            status,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn status(&self) -> &Arc<StatusTracker> {
        &self.status
    }

    /// Check a submission without side effects.
    pub fn validate(&self, submission: &Submission) -> Result<ImageFormat> {
        if submission.title.trim().is_empty() {
            return Err(Error::Validation("title is required".to_string()));
        }
        check_length("title", &submission.title, MAX_TITLE_CHARS)?;
        check_length("description", &submission.description, MAX_DESCRIPTION_CHARS)?;
        check_length("location", &submission.location, MAX_LOCATION_CHARS)?;

        if submission.image.is_empty() {
            return Err(Error::Validation("image is required".to_string()));
        }
        if submission.image.len() > self.max_image_bytes {
            return Err(Error::Validation(format!(
                "image is {} bytes, limit is {}",
                submission.image.len(),
                self.max_image_bytes
            )));
        }
        Ok(ImageFormat::resolve(
            &submission.image,
            submission.content_type.as_deref(),
        )?)
    }

    /// Ingest a submission and wait until it is searchable.
    ///
    /// The work runs on its own task: dropping the returned future does not
    /// cancel it, so the saga always either commits or unwinds.
    pub async fn ingest(
        self: &Arc<Self>,
        submission: Submission,
        submitter: &Identity,
    ) -> Result<ItemRecord> {
        let format = self.validate(&submission)?;
        let id = ItemId::generate();
        self.status.start(&id);
        let handle = self.spawn_run(id.clone(), format, submission, Owner::from(submitter));
        self.join(&id, handle).await
    }

    /// Validate, register `Pending` and ingest in the background.
    ///
    /// Returns the new id immediately; progress is visible through the
    /// Status Tracker.
    pub fn submit(self: &Arc<Self>, submission: Submission, submitter: &Identity) -> Result<ItemId> {
        let format = self.validate(&submission)?;
        let id = ItemId::generate();
        self.status.start(&id);

        let handle = self.spawn_run(id.clone(), format, submission, Owner::from(submitter));
        let pipeline = Arc::clone(self);
        let watched = id.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.join(&watched, handle).await {
                debug!("Background ingestion of {} ended with: {}", watched, e);
            }
        });
        Ok(id)
    }

    fn spawn_run(
        self: &Arc<Self>,
        id: ItemId,
        format: ImageFormat,
        submission: Submission,
        owner: Owner,
    ) -> JoinHandle<Result<ItemRecord>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(id, format, submission, owner).await })
    }

    /// Await an ingestion task, failing its status if the task died.
    async fn join(&self, id: &ItemId, handle: JoinHandle<Result<ItemRecord>>) -> Result<ItemRecord> {
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Ingestion task for {} did not complete: {}", id, e);
                self.status
                    .mark(id, IngestionState::Failed, "Ingestion was interrupted");
                Err(Error::Interrupted(e.to_string()))
            }
        }
    }

    async fn run(
        &self,
        id: ItemId,
        format: ImageFormat,
        submission: Submission,
        owner: Owner,
    ) -> Result<ItemRecord> {
        let mut saga = Saga::new(format!("ingest {}", id));
        match self.index(&id, format, &submission, owner, &mut saga).await {
            Ok(record) => {
                saga.commit();
                self.status
                    .mark(&id, IngestionState::Indexed, "Item is searchable");
                info!("Indexed item {} ({})", id, record.metadata.title);
                Ok(record)
            }
            Err(e) => {
                let orphaned = saga.unwind().await;
                if !orphaned.is_empty() {
                    warn!("Ingestion of {} left side effects behind: {:?}", id, orphaned);
                }
                self.status.mark(&id, IngestionState::Failed, e.to_string());
                error!("Ingestion of {} failed: {}", id, e);
                Err(e)
            }
        }
    }

    async fn index(
        &self,
        id: &ItemId,
        format: ImageFormat,
        submission: &Submission,
        submitter: Owner,
        saga: &mut Saga,
    ) -> Result<ItemRecord> {
        let file_name = blob_file_name(id, format);
        let image_url = self
            .blobs
            .put(&file_name, &submission.image, format.mime())
            .await?;
        let blobs = Arc::clone(&self.blobs);
        let stored_url = image_url.clone();
        saga.register("store blob", move || {
            async move { blobs.delete(&stored_url).await.map_err(|e| e.to_string()) }.boxed()
        });

        self.status
            .mark(id, IngestionState::Processing, "Computing embedding");
        let embedding = self
            .embedder
            .embed_image(&submission.image, Some(format.mime()))
            .await?;

        let metadata = ItemMetadata {
            title: submission.title.trim().to_string(),
            description: submission.description.trim().to_string(),
            location: submission.location.trim().to_string(),
            image_url,
            submitter,
            created_at: Utc::now(),
        };
        self.store
            .insert(id.clone(), embedding.clone(), metadata.clone())
            .await?;

        Ok(ItemRecord {
            id: id.clone(),
            embedding,
            metadata,
        })
    }
}

fn check_length(field: &str, value: &str, max_chars: usize) -> Result<()> {
    let chars = value.chars().count();
    if chars > max_chars {
        return Err(Error::Validation(format!(
            "{field} is {chars} characters, limit is {max_chars}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};

    use super::*;
    use crate::{
        blob::MemoryBlobStore,
        embedding::{EmbeddingModel, PreparedImage},
        error::{EmbeddingError, ErrorKind},
        store::MemoryVectorStore,
    };

    struct FixedModel {
        fail_images: bool,
    }

    #[async_trait]
    impl EmbeddingModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            3
        }

        async fn embed_text(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        async fn embed_image(
            &self,
            _image: &PreparedImage,
        ) -> std::result::Result<Vec<f32>, EmbeddingError> {
            if self.fail_images {
                return Err(EmbeddingError::Inference("gpu unavailable".to_string()));
            }
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn png() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn submission(title: &str) -> Submission {
        Submission {
            title: title.to_string(),
            description: "navy, two pockets".to_string(),
            location: "library".to_string(),
            image: png(),
            content_type: Some("image/png".to_string()),
        }
    }

    struct Fixture {
        pipeline: Arc<IngestionPipeline>,
        store: Arc<MemoryVectorStore>,
        blobs: Arc<MemoryBlobStore>,
        status: Arc<StatusTracker>,
    }

    /// Holds image embedding until a permit is released.
    struct GatedModel {
        gate: tokio::sync::Semaphore,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingModel for GatedModel {
        fn name(&self) -> &str {
            "gated"
        }

        fn dimension(&self) -> usize {
            3
        }

        async fn embed_text(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        async fn embed_image(
            &self,
            _image: &PreparedImage,
        ) -> std::result::Result<Vec<f32>, EmbeddingError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
            if self.fail {
                return Err(EmbeddingError::Inference("model crashed".to_string()));
            }
            Ok(vec![0.0, 1.0, 0.0])
        }
    }

    fn fixture(fail_images: bool, capacity: usize) -> Fixture {
        fixture_with(Arc::new(FixedModel { fail_images }), capacity)
    }

    fn fixture_with(model: Arc<dyn EmbeddingModel>, capacity: usize) -> Fixture {
        let store = Arc::new(MemoryVectorStore::new(3, capacity));
        let blobs = Arc::new(MemoryBlobStore::new("/images"));
        let status = Arc::new(StatusTracker::new(Duration::from_secs(60), 100));
        let embedder = Arc::new(EmbeddingAdapter::with_model(model, 64));
        let pipeline = Arc::new(IngestionPipeline::new(
            embedder,
            store.clone(),
            blobs.clone(),
            status.clone(),
        ));
        Fixture {
            pipeline,
            store,
            blobs,
            status,
        }
    }

    #[tokio::test]
    async fn test_ingest_indexes_item() {
        let f = fixture(false, 10);
        let owner = Identity::member("u1", "u1@example.com");
        let record = f
            .pipeline
            .ingest(submission("  blue backpack "), &owner)
            .await
            .unwrap();

        assert_eq!(record.metadata.title, "blue backpack");
        assert_eq!(record.metadata.submitter.email, "u1@example.com");
        assert_eq!(
            record.metadata.image_url,
            format!("/images/{}.png", record.id)
        );
        assert!(f.store.get(&record.id).await.unwrap().is_some());
        assert_eq!(f.blobs.len(), 1);
        assert_eq!(
            f.status.peek(&record.id).unwrap().state,
            IngestionState::Indexed
        );
    }

    #[tokio::test]
    async fn test_embedding_failure_removes_blob() {
        let f = fixture(true, 10);
        let owner = Identity::member("u1", "u1@example.com");
        let err = f
            .pipeline
            .ingest(submission("wallet"), &owner)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(f.blobs.is_empty());
        assert_eq!(f.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_removes_blob() {
        let f = fixture(false, 1);
        let owner = Identity::member("u1", "u1@example.com");
        f.pipeline.ingest(submission("first"), &owner).await.unwrap();

        let err = f
            .pipeline
            .ingest(submission("second"), &owner)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(f.blobs.len(), 1);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_validation_has_no_side_effects() {
        let f = fixture(false, 10);
        let owner = Identity::member("u1", "u1@example.com");

        let err = f.pipeline.ingest(submission("   "), &owner).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut long = submission("umbrella");
        long.location = "x".repeat(MAX_LOCATION_CHARS + 1);
        assert!(f.pipeline.ingest(long, &owner).await.is_err());

        let mut empty = submission("umbrella");
        empty.image.clear();
        assert!(f.pipeline.ingest(empty, &owner).await.is_err());

        let mut text = submission("umbrella");
        text.image = b"not an image at all".to_vec();
        let err = f.pipeline.ingest(text, &owner).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(f.blobs.is_empty());
        assert!(f.status.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected() {
        let f = fixture(false, 10);
        let pipeline = Arc::new(
            IngestionPipeline::new(
                Arc::new(EmbeddingAdapter::with_model(
                    Arc::new(FixedModel { fail_images: false }),
                    64,
                )),
                f.store.clone(),
                f.blobs.clone(),
                f.status.clone(),
            )
            .with_max_image_bytes(16),
        );
        let owner = Identity::member("u1", "u1@example.com");
        let err = pipeline.ingest(submission("keys"), &owner).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_submit_runs_in_background() {
        let f = fixture(false, 10);
        let owner = Identity::member("u1", "u1@example.com");
        let id = f.pipeline.submit(submission("scarf"), &owner).unwrap();

        let mut state = f.status.peek(&id).unwrap().state;
        for _ in 0..100 {
            if state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            state = f.status.peek(&id).unwrap().state;
        }
        assert_eq!(state, IngestionState::Indexed);
        assert!(f.store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_failure_is_reported_in_status() {
        let f = fixture(true, 10);
        let owner = Identity::member("u1", "u1@example.com");
        let id = f.pipeline.submit(submission("scarf"), &owner).unwrap();

        let mut status = f.status.peek(&id).unwrap();
        for _ in 0..100 {
            if status.state.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = f.status.peek(&id).unwrap();
        }
        assert_eq!(status.state, IngestionState::Failed);
        assert!(status.message.contains("gpu unavailable"));
        assert!(f.blobs.is_empty());
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    /// Start an ingestion held at the embedding step, then drop its caller.
    async fn abandon_mid_embedding(f: &Fixture) {
        let pipeline = f.pipeline.clone();
        let caller = tokio::spawn(async move {
            let owner = Identity::member("u1", "u1@example.com");
            pipeline.ingest(submission("umbrella"), &owner).await
        });

        let blobs = f.blobs.clone();
        eventually("blob upload", move || blobs.len() == 1).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_caller_still_completes_ingestion() {
        let model = Arc::new(GatedModel {
            gate: tokio::sync::Semaphore::new(0),
            fail: false,
        });
        let f = fixture_with(model.clone(), 10);
        abandon_mid_embedding(&f).await;

        model.gate.add_permits(1);
        for _ in 0..400 {
            if f.store.len().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.store.len().await, 1);
        assert_eq!(f.blobs.len(), 1);

        assert_eq!(f.status.len(), 1);
        assert_eq!(f.status.prune_at(Utc::now() + chrono::Duration::days(1)), 1);
        assert!(f.status.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_caller_still_unwinds_failed_ingestion() {
        let model = Arc::new(GatedModel {
            gate: tokio::sync::Semaphore::new(0),
            fail: true,
        });
        let f = fixture_with(model.clone(), 10);
        abandon_mid_embedding(&f).await;

        model.gate.add_permits(1);
        let blobs = f.blobs.clone();
        eventually("blob compensation", move || blobs.is_empty()).await;
        assert_eq!(f.store.len().await, 0);

        assert_eq!(f.status.len(), 1);
        assert_eq!(f.status.prune_at(Utc::now() + chrono::Duration::days(1)), 1);
        assert!(f.status.is_empty());
    }
}
