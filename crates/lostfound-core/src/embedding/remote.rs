//! Embedding model served by an external HTTP service.
//!
//! Expected endpoints:
//! - `GET  {endpoint}/info` -> `{ "model": "...", "dimension": 512 }`
//! - `POST {endpoint}/embed/text` `{ "text": "..." }` -> `{ "embedding": [...] }`
//! - `POST {endpoint}/embed/image` `{ "image_base64": "...", "mime": "image/png", "width": .., "height": .. }`
//!   -> `{ "embedding": [...] }`
//!
//! Failures are surfaced immediately; ingestion is user-initiated and the
//! client re-submits.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingModel, ModelLoader, PreparedImage};
use crate::{config::EmbeddingConfig, error::EmbeddingError};

/// Connects to the embedding service and checks its dimension.
pub struct RemoteModelLoader {
    endpoint: String,
    timeout: Duration,
}

impl RemoteModelLoader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

#[async_trait]
impl ModelLoader for RemoteModelLoader {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbeddingError::ModelLoad(format!("failed to build HTTP client: {e}")))?;

        let info_url = format!("{}/info", self.endpoint);
        let response = client
            .get(&info_url)
            .send()
            .await
            .map_err(|e| EmbeddingError::ModelLoad(format!("{info_url}: {e}")))?;
        if !response.status().is_success() {
            return Err(EmbeddingError::ModelLoad(format!(
                "{info_url} returned {}",
                response.status()
            )));
        }
        let info: ModelInfo = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ModelLoad(format!("malformed model info: {e}")))?;

        Ok(Arc::new(RemoteEmbeddingModel {
            client,
            endpoint: self.endpoint.clone(),
            name: info.model,
            dimension: info.dimension,
        }))
    }
}

/// Client for a loaded remote model.
pub struct RemoteEmbeddingModel {
    client: Client,
    endpoint: String,
    name: String,
    dimension: usize,
}

impl RemoteEmbeddingModel {
    async fn post<T: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &T,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}{}", self.endpoint, route);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Inference(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Inference(format!(
                "{url} returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Inference(format!("malformed embedding response: {e}")))?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingModel for RemoteEmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.post("/embed/text", &TextRequest { text }).await
    }

    async fn embed_image(&self, image: &PreparedImage) -> Result<Vec<f32>, EmbeddingError> {
        let png = image.to_png()?;
        let request = ImageRequest {
            image_base64: STANDARD.encode(png),
            mime: "image/png",
            width: image.width(),
            height: image.height(),
        };
        self.post("/embed/image", &request).await
    }
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ImageRequest {
    image_base64: String,
    mime: &'static str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}
