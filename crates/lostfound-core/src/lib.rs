//! Embedding-backed similarity search and ingestion for lost-and-found items.
//!
//! This crate provides:
//! - Embedding Adapter with lazy, single-flight model loading
//! - Vector Store with cosine nearest-neighbour search
//! - Ingestion Pipeline with compensating rollback
//! - Status Tracker for client polling
//! - Search and Deletion services
//!
//! The HTTP surface lives in `lostfound-api`.

pub mod auth;
pub mod blob;
pub mod config;
pub mod deletion;
pub mod embedding;
pub mod error;
pub mod formats;
pub mod ingest;
pub mod models;
pub mod saga;
pub mod search;
pub mod status;
pub mod store;

pub use auth::{Identity, IdentityProvider, JwtIdentityProvider, Role};
pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use config::{EmbeddingBackend, LostFoundConfig};
pub use deletion::{DeletionCoordinator, DeletionOutcome};
pub use embedding::{EmbeddingAdapter, EmbeddingModel, ModelLoader, PreparedImage};
pub use error::{AuthError, BlobError, EmbeddingError, Error, ErrorKind, Result, StoreError};
pub use formats::ImageFormat;
pub use ingest::IngestionPipeline;
pub use models::{
    IngestionState, IngestionStatus, ItemId, ItemMetadata, ItemRecord, Owner, ResultItem,
    Submission, TopK,
};
pub use saga::Saga;
pub use search::{SearchParams, SearchService};
pub use status::{poll_until_terminal, PollOutcome, PollPolicy, StatusTracker};
pub use store::{MemoryVectorStore, SearchHit, VectorStore};
