//! Application state for the API server

use std::{sync::Arc, time::Instant};

use lostfound_core::{
    config::{EmbeddingConfig, LostFoundConfig},
    embedding::RemoteModelLoader,
    BlobStore, DeletionCoordinator, EmbeddingAdapter, EmbeddingBackend, Error, IdentityProvider,
    IngestionPipeline, JwtIdentityProvider, LocalBlobStore, MemoryVectorStore, ModelLoader,
    SearchParams, SearchService, StatusTracker, TopK, VectorStore,
};
use tracing::info;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LostFoundConfig>,
    /// Verifies bearer tokens
    pub identity: Arc<dyn IdentityProvider>,
    pub embedder: Arc<EmbeddingAdapter>,
    pub store: Arc<dyn VectorStore>,
    pub status: Arc<StatusTracker>,
    pub pipeline: Arc<IngestionPipeline>,
    pub search: Arc<SearchService>,
    pub deletion: Arc<DeletionCoordinator>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services around the given collaborators.
    pub fn new(
        config: LostFoundConfig,
        identity: Arc<dyn IdentityProvider>,
        embedder: Arc<EmbeddingAdapter>,
        store: Arc<dyn VectorStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let status = Arc::new(StatusTracker::from_config(&config.status));
        let pipeline = Arc::new(
            IngestionPipeline::new(
                embedder.clone(),
                store.clone(),
                blobs.clone(),
                status.clone(),
            )
            .with_max_image_bytes(config.server.max_body_bytes),
        );
        let search = Arc::new(SearchService::new(
            embedder.clone(),
            store.clone(),
            blobs.clone(),
        ));
        let deletion = Arc::new(DeletionCoordinator::new(store.clone(), blobs));

        Self {
            config: Arc::new(config),
            identity,
            embedder,
            store,
            status,
            pipeline,
            search,
            deletion,
            start_time: Instant::now(),
        }
    }

    /// Build the production collaborators from configuration.
    pub async fn from_config(config: LostFoundConfig) -> Result<Self, Error> {
        let identity: Arc<dyn IdentityProvider> = Arc::new(JwtIdentityProvider::new(&config.auth));
        let embedder = Arc::new(EmbeddingAdapter::new(
            model_loader(&config.embedding)?,
            config.embedding.dimension,
            config.embedding.max_image_dimension,
        ));

        let store: Arc<dyn VectorStore> = match &config.store.snapshot_path {
            Some(path) => Arc::new(MemoryVectorStore::open(
                config.embedding.dimension,
                config.store.capacity,
                path,
            )?),
            None => Arc::new(MemoryVectorStore::new(
                config.embedding.dimension,
                config.store.capacity,
            )),
        };

        let blobs: Arc<dyn BlobStore> = Arc::new(
            LocalBlobStore::new(config.blob.root.clone(), config.blob.public_prefix.clone())
                .await?,
        );
        info!(
            "Storing images under {} served at {}",
            config.blob.root.display(),
            config.blob.public_prefix
        );

        Ok(Self::new(config, identity, embedder, store, blobs))
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Fill in configured defaults for omitted search parameters.
    pub fn search_params(&self, min_similarity: Option<f32>, top_k: Option<TopK>) -> SearchParams {
        SearchParams::new(
            min_similarity.unwrap_or(self.config.search.default_min_similarity),
            top_k.unwrap_or(self.config.search.default_top_k),
        )
    }
}

fn model_loader(config: &EmbeddingConfig) -> Result<Arc<dyn ModelLoader>, Error> {
    match config.backend {
        EmbeddingBackend::Remote => {
            info!("Using remote embedding service at {}", config.endpoint);
            Ok(Arc::new(RemoteModelLoader::from_config(config)))
        }
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => {
            info!("Using in-process CLIP model");
            Ok(Arc::new(lostfound_core::embedding::LocalModelLoader::new(
                config.cache_dir.clone(),
            )))
        }
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => Err(Error::Config(
            "embedding.backend = \"local\" requires the local-embeddings feature".to_string(),
        )),
    }
}
