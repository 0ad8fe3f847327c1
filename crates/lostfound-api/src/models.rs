//! API request and response models

use lostfound_core::{IngestionStatus, ItemRecord, ResultItem, TopK};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResultItemResponse {
    /// Item ID
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// URL of the stored image
    pub image_url: String,
    /// Contact e-mail of the person who found the item
    pub submitter_email: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

impl From<ResultItem> for ResultItemResponse {
    fn from(item: ResultItem) -> Self {
        Self {
            id: item.id.to_string(),
            title: item.title,
            description: item.description,
            location: item.location,
            image_url: item.image_url,
            submitter_email: item.submitter_email,
            score: item.score,
        }
    }
}

/// Search response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    /// Ranked matches, best first
    pub items: Vec<ResultItemResponse>,
}

impl SearchResponse {
    pub fn from_items(items: Vec<ResultItem>) -> Self {
        Self {
            items: items.into_iter().map(ResultItemResponse::from).collect(),
        }
    }
}

/// Text search request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchRequest {
    /// Free-text description of the lost item
    pub query: String,
    /// Minimum similarity in [-1, 1]
    pub min_similarity: Option<f32>,
    /// Result cap: a number or "all"
    #[schema(value_type = Option<String>, example = "10")]
    pub top_k: Option<TopK>,
}

/// Image search by reference to a stored image
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlSearchRequest {
    pub image_url: String,
    pub min_similarity: Option<f32>,
    #[schema(value_type = Option<String>, example = "all")]
    pub top_k: Option<TopK>,
}

/// Search using a stored item's embedding
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimilarSearchRequest {
    pub item_id: String,
    pub min_similarity: Option<f32>,
    #[schema(value_type = Option<String>, example = "10")]
    pub top_k: Option<TopK>,
}

/// Multipart form accepted by `/upload`
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// PNG, JPEG, GIF or WebP
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

/// Uploaded item
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadedItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Set once the image is stored; absent while ingestion is pending
    pub image_url: Option<String>,
    /// Ingestion state: pending, processing, indexed or failed
    pub status: String,
}

impl From<&ItemRecord> for UploadedItem {
    fn from(record: &ItemRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.metadata.title.clone(),
            description: record.metadata.description.clone(),
            location: record.metadata.location.clone(),
            image_url: Some(record.metadata.image_url.clone()),
            status: "indexed".to_string(),
        }
    }
}

/// Upload response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub item: UploadedItem,
}

/// Status query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    /// Item ID returned by the upload
    pub image_id: String,
}

/// Ingestion status response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Whether the server is tracking this id
    pub exists: bool,
    /// pending, processing, indexed, failed or unknown
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub attempt_count: u32,
}

impl StatusResponse {
    pub fn unknown(id: &str) -> Self {
        Self {
            exists: false,
            status: "unknown".to_string(),
            message: format!("No ingestion is tracked for {id}"),
            attempt_count: 0,
        }
    }
}

impl From<IngestionStatus> for StatusResponse {
    fn from(status: IngestionStatus) -> Self {
        Self {
            exists: true,
            status: status.state.as_str().to_string(),
            message: status.message,
            attempt_count: status.attempt_count,
        }
    }
}

/// Delete request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub item_id: String,
    /// Stored image file name; must match the item when given
    pub file_name: Option<String>,
}

/// Delete response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub item_id: String,
    /// False when the image could not be removed
    pub blob_removed: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime: u64,
    /// Number of searchable items
    pub items: usize,
    /// Whether the embedding model has been loaded yet
    pub model_loaded: bool,
}
