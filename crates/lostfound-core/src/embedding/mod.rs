//! Embedding Adapter: images and text in, unit-length vectors out.
//!
//! The adapter owns the one piece of initialize-once state in the service:
//! the loaded model. It is loaded lazily on first use through a
//! [`ModelLoader`] and shared read-only afterwards. Concurrent first calls
//! wait on the same load instead of racing.

pub mod remote;

#[cfg(feature = "local-embeddings")]
pub mod local;

use std::{io::Cursor, sync::Arc};

use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, RgbImage};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{error::EmbeddingError, formats::ImageFormat};

pub use remote::{RemoteEmbeddingModel, RemoteModelLoader};

#[cfg(feature = "local-embeddings")]
pub use local::{LocalClipModel, LocalModelLoader};

/// A decoded, downscaled RGB image ready for a model.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub pixels: RgbImage,
}

impl PreparedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Re-encode as PNG for models that take encoded bytes.
    pub fn to_png(&self) -> Result<Vec<u8>, EmbeddingError> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.pixels.clone())
            .write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|e| EmbeddingError::Inference(format!("png encode failed: {e}")))?;
        Ok(buffer.into_inner())
    }
}

/// A loaded embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Human readable model name for logs.
    fn name(&self) -> &str;

    /// Length of the vectors this model returns.
    fn dimension(&self) -> usize;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_image(&self, image: &PreparedImage) -> Result<Vec<f32>, EmbeddingError>;
}

/// Loads a model. Called at most once per adapter.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError>;
}

/// Loader that hands out an already constructed model.
pub struct PreloadedModel(pub Arc<dyn EmbeddingModel>);

#[async_trait]
impl ModelLoader for PreloadedModel {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        Ok(self.0.clone())
    }
}

/// Wraps the external model with preprocessing and output checks.
pub struct EmbeddingAdapter {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn EmbeddingModel>>,
    dimension: usize,
    max_image_dimension: u32,
}

impl EmbeddingAdapter {
    /// Create an adapter; nothing is loaded until the first embed call.
    pub fn new(loader: Arc<dyn ModelLoader>, dimension: usize, max_image_dimension: u32) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            dimension,
            max_image_dimension: max_image_dimension.max(1),
        }
    }

    /// Convenience constructor around an existing model.
    pub fn with_model(model: Arc<dyn EmbeddingModel>, max_image_dimension: u32) -> Self {
        let dimension = model.dimension();
        Self::new(Arc::new(PreloadedModel(model)), dimension, max_image_dimension)
    }

    /// Vector length produced by this adapter.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn max_image_dimension(&self) -> u32 {
        self.max_image_dimension
    }

    /// Whether the model has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get the model, loading it on first use.
    ///
    /// A failed load is not memoized; the next call tries again.
    pub async fn model(&self) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Loading embedding model");
                let model = self.loader.load().await?;
                if model.dimension() != self.dimension {
                    return Err(EmbeddingError::ModelLoad(format!(
                        "model {} produces {} dimensions, expected {}",
                        model.name(),
                        model.dimension(),
                        self.dimension
                    )));
                }
                info!("Embedding model {} ready ({} dims)", model.name(), self.dimension);
                Ok(model)
            })
            .await?;
        Ok(model.clone())
    }

    /// Embed free text. Whitespace is collapsed before embedding.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = normalize_text(text);
        if text.is_empty() {
            return Err(EmbeddingError::Inference(
                "cannot embed empty text".to_string(),
            ));
        }
        let model = self.model().await?;
        let vector = model.embed_text(&text).await?;
        self.finish(vector)
    }

    /// Embed raw image bytes after sniffing and downscaling.
    pub async fn embed_image(
        &self,
        bytes: &[u8],
        mime: Option<&str>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let format = ImageFormat::resolve(bytes, mime)?;
        let owned = bytes.to_vec();
        let max_dimension = self.max_image_dimension;
        let prepared =
            tokio::task::spawn_blocking(move || prepare_image(&owned, format, max_dimension))
                .await
                .map_err(|e| EmbeddingError::Inference(format!("preprocessing task failed: {e}")))??;
        debug!(
            "Prepared {} image at {}x{}",
            format.extension(),
            prepared.width(),
            prepared.height()
        );
        let model = self.model().await?;
        let vector = model.embed_image(&prepared).await?;
        self.finish(vector)
    }

    fn finish(&self, mut vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::Degenerate);
        }
        if !normalize(&mut vector) {
            return Err(EmbeddingError::Degenerate);
        }
        Ok(vector)
    }
}

/// Decode and downscale so neither side exceeds `max_dimension`.
pub fn prepare_image(
    bytes: &[u8],
    format: ImageFormat,
    max_dimension: u32,
) -> Result<PreparedImage, EmbeddingError> {
    let decoded = image::load_from_memory_with_format(bytes, format.decoder_format())
        .map_err(|e| EmbeddingError::CorruptImage(e.to_string()))?;
    let resized = if decoded.width().max(decoded.height()) > max_dimension {
        // resize keeps the aspect ratio inside the bounding box
        decoded.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        decoded
    };
    Ok(PreparedImage {
        pixels: resized.to_rgb8(),
    })
}

/// Trim and collapse runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// L2-normalize in place. Returns false for a zero vector.
pub fn normalize(values: &mut [f32]) -> bool {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for v in values {
            *v /= norm;
        }
        true
    } else {
        false
    }
}
