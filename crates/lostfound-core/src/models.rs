//! Data models for items, search results and ingestion status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Identity;

/// Opaque, immutable item identifier assigned when ingestion starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Allocate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner reference copied from the submitter's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Stable subject id from the Auth Provider.
    pub subject: String,
    /// Contact e-mail shown with search results.
    pub email: String,
}

impl From<&Identity> for Owner {
    fn from(identity: &Identity) -> Self {
        Self {
            subject: identity.subject.clone(),
            email: identity.email.clone(),
        }
    }
}

/// Metadata stored next to an item's embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: String,
    pub description: String,
    pub location: String,
    /// Reference into the Blob Store.
    pub image_url: String,
    /// Used for delete authorization.
    pub submitter: Owner,
    /// Display ordering only.
    pub created_at: DateTime<Utc>,
}

/// The unit of search: an embedding plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub embedding: Vec<f32>,
    pub metadata: ItemMetadata,
}

/// A raw found-item submission before ingestion.
#[derive(Debug, Clone)]
pub struct Submission {
    pub title: String,
    pub description: String,
    pub location: String,
    pub image: Vec<u8>,
    /// Declared MIME type from the upload, if any.
    pub content_type: Option<String>,
}

/// One ranked search hit with owner metadata joined in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub image_url: String,
    pub submitter_email: String,
    /// Cosine similarity in [-1, 1], full precision.
    pub score: f32,
}

impl ResultItem {
    /// Build a result from a store hit.
    pub fn from_hit(id: ItemId, score: f32, metadata: ItemMetadata) -> Self {
        Self {
            id,
            title: metadata.title,
            description: metadata.description,
            location: metadata.location,
            image_url: metadata.image_url,
            submitter_email: metadata.submitter.email,
            score,
        }
    }
}

/// Result cap for a search.
///
/// Serialized as a number or the string `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopK {
    /// At most this many results.
    Limit(usize),
    /// Every qualifying record, bounded by store capacity.
    All,
}

impl TopK {
    /// Resolve to a concrete cap given the store capacity.
    pub fn resolve(self, capacity: usize) -> usize {
        match self {
            TopK::Limit(limit) => limit.min(capacity),
            TopK::All => capacity,
        }
    }
}

impl Default for TopK {
    fn default() -> Self {
        TopK::Limit(10)
    }
}

impl Serialize for TopK {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TopK::Limit(limit) => serializer.serialize_u64(*limit as u64),
            TopK::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for TopK {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(usize),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(limit) => Ok(TopK::Limit(limit)),
            Raw::Text(text) if text.eq_ignore_ascii_case("all") => Ok(TopK::All),
            Raw::Text(text) => text.trim().parse().map(TopK::Limit).map_err(|_| {
                serde::de::Error::custom(format!("expected a number or \"all\", got {text:?}"))
            }),
        }
    }
}

/// Ingestion state machine: Pending -> Processing -> Indexed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionState {
    Pending,
    Processing,
    Indexed,
    Failed,
}

impl IngestionState {
    /// Whether the state can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestionState::Indexed | IngestionState::Failed)
    }

    /// Lowercase name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            IngestionState::Pending => "pending",
            IngestionState::Processing => "processing",
            IngestionState::Indexed => "indexed",
            IngestionState::Failed => "failed",
        }
    }
}

/// Ephemeral ingestion status keyed by item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub state: IngestionState,
    pub message: String,
    /// Number of client polls observed.
    pub attempt_count: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set when the entry first reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_parses_number_and_all() {
        let limit: TopK = serde_json::from_str("5").unwrap();
        assert_eq!(limit, TopK::Limit(5));

        let all: TopK = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, TopK::All);

        let upper: TopK = serde_json::from_str("\"ALL\"").unwrap();
        assert_eq!(upper, TopK::All);

        assert!(serde_json::from_str::<TopK>("\"many\"").is_err());
    }

    #[test]
    fn test_top_k_resolve() {
        assert_eq!(TopK::Limit(5).resolve(100), 5);
        assert_eq!(TopK::Limit(500).resolve(100), 100);
        assert_eq!(TopK::All.resolve(100), 100);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!IngestionState::Pending.is_terminal());
        assert!(!IngestionState::Processing.is_terminal());
        assert!(IngestionState::Indexed.is_terminal());
        assert!(IngestionState::Failed.is_terminal());
        assert_eq!(
            serde_json::to_string(&IngestionState::Indexed).unwrap(),
            "\"indexed\""
        );
    }

    #[test]
    fn test_item_ids_are_unique() {
        assert_ne!(ItemId::generate(), ItemId::generate());
    }
}
