//! In-process CLIP ViT-B/32 via fastembed (512 dimensions).
//!
//! Both towers share one embedding space, so text queries match image
//! embeddings. Inference runs on the blocking pool.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use fastembed::{
    EmbeddingModel as TextModelKind, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions,
    TextEmbedding, TextInitOptions,
};
use parking_lot::Mutex;
use tracing::info;

use super::{EmbeddingModel, ModelLoader, PreparedImage};
use crate::error::EmbeddingError;

const CLIP_DIMENSION: usize = 512;

/// Downloads (first run) and loads the CLIP model pair.
pub struct LocalModelLoader {
    cache_dir: Option<PathBuf>,
}

impl LocalModelLoader {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }
}

#[async_trait]
impl ModelLoader for LocalModelLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        let cache_dir = self.cache_dir.clone();
        let model = tokio::task::spawn_blocking(move || {
            let mut text_options = TextInitOptions::new(TextModelKind::ClipVitB32);
            let mut image_options = ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32);
            if let Some(dir) = cache_dir {
                info!("Using model cache at {}", dir.display());
                text_options = text_options.with_cache_dir(dir.clone());
                image_options = image_options.with_cache_dir(dir);
            }
            let text = TextEmbedding::try_new(text_options)
                .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
            let image = ImageEmbedding::try_new(image_options)
                .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
            Ok::<_, EmbeddingError>(LocalClipModel {
                text: Arc::new(Mutex::new(text)),
                image: Arc::new(Mutex::new(image)),
            })
        })
        .await
        .map_err(|e| EmbeddingError::ModelLoad(format!("model load task failed: {e}")))??;
        Ok(Arc::new(model))
    }
}

/// Loaded CLIP text + vision encoders.
pub struct LocalClipModel {
    text: Arc<Mutex<TextEmbedding>>,
    image: Arc<Mutex<ImageEmbedding>>,
}

#[async_trait]
impl EmbeddingModel for LocalClipModel {
    fn name(&self) -> &str {
        "clip-vit-b32"
    }

    fn dimension(&self) -> usize {
        CLIP_DIMENSION
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoder = self.text.clone();
        let input = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut encoder = encoder.lock();
            encoder
                .embed(vec![input], None)
                .map_err(|e| EmbeddingError::Inference(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::Inference("no embedding returned".to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Inference(format!("inference task failed: {e}")))?
    }

    async fn embed_image(&self, image: &PreparedImage) -> Result<Vec<f32>, EmbeddingError> {
        let encoder = self.image.clone();
        let png = image.to_png()?;
        tokio::task::spawn_blocking(move || {
            let mut encoder = encoder.lock();
            encoder
                .embed_bytes(&[png.as_slice()], None)
                .map_err(|e| EmbeddingError::Inference(e.to_string()))?
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::Inference("no embedding returned".to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Inference(format!("inference task failed: {e}")))?
    }
}
