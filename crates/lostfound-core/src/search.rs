//! Search Service: text, image and "find similar" queries.

use std::sync::Arc;

use tracing::debug;

use crate::{
    blob::BlobStore,
    embedding::EmbeddingAdapter,
    error::{BlobError, Error, Result},
    models::{ItemId, ResultItem, TopK},
    store::{SearchHit, VectorStore},
};

/// Threshold and cap for one search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub min_similarity: f32,
    pub top_k: TopK,
}

impl SearchParams {
    pub fn new(min_similarity: f32, top_k: TopK) -> Self {
        Self {
            min_similarity,
            top_k,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::Validation(format!(
                "min_similarity {} outside [-1, 1]",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// Embeds queries and ranks stored items against them.
pub struct SearchService {
    embedder: Arc<EmbeddingAdapter>,
    store: Arc<dyn VectorStore>,
    blobs: Arc<dyn BlobStore>,
}

impl SearchService {
    pub fn new(
        embedder: Arc<EmbeddingAdapter>,
        store: Arc<dyn VectorStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            blobs,
        }
    }

    /// Search by free text. A blank query yields no results and no store call.
    pub async fn search_by_text(&self, query: &str, params: SearchParams) -> Result<Vec<ResultItem>> {
        params.validate()?;
        if query.trim().is_empty() {
            debug!("Blank text query, skipping search");
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_text(query).await?;
        self.ranked(&vector, params, None).await
    }

    /// Search by an uploaded image.
    pub async fn search_by_image(
        &self,
        image: &[u8],
        mime: Option<&str>,
        params: SearchParams,
    ) -> Result<Vec<ResultItem>> {
        params.validate()?;
        if image.is_empty() {
            return Err(Error::Validation("image is required".to_string()));
        }
        let vector = self.embedder.embed_image(image, mime).await?;
        self.ranked(&vector, params, None).await
    }

    /// Search by the image behind a stored blob URL.
    ///
    /// The blob is fetched and re-embedded through the same path as an
    /// uploaded query image.
    pub async fn search_by_image_url(
        &self,
        url: &str,
        params: SearchParams,
    ) -> Result<Vec<ResultItem>> {
        params.validate()?;
        let bytes = self.blobs.get(url).await.map_err(|e| match e {
            BlobError::NotFound(url) => Error::NotFound(url),
            BlobError::InvalidReference(url) => {
                Error::Validation(format!("not an image reference: {url}"))
            }
            other => Error::Blob(other),
        })?;
        self.search_by_image(&bytes, None, params).await
    }

    /// Search with an existing item's stored vector, excluding the item.
    pub async fn search_similar_to_item(
        &self,
        id: &ItemId,
        params: SearchParams,
    ) -> Result<Vec<ResultItem>> {
        params.validate()?;
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.ranked(&record.embedding, params, Some(id)).await
    }

    async fn ranked(
        &self,
        vector: &[f32],
        params: SearchParams,
        exclude: Option<&ItemId>,
    ) -> Result<Vec<ResultItem>> {
        // one extra slot so excluding the source item keeps the cap full
        let top_k = match (params.top_k, exclude) {
            (TopK::Limit(limit), Some(_)) => TopK::Limit(limit.saturating_add(1)),
            (top_k, _) => top_k,
        };
        let hits = self
            .store
            .search(vector, top_k, params.min_similarity)
            .await?;
        let cap = params.top_k.resolve(self.store.capacity());

        let items: Vec<ResultItem> = hits
            .into_iter()
            .filter(|hit| Some(&hit.id) != exclude)
            .take(cap)
            .map(|SearchHit { id, similarity, metadata }| {
                ResultItem::from_hit(id, similarity, metadata)
            })
            .collect();
        debug!("Search returned {} items", items.len());
        Ok(items)
    }
}
