//! Error types for lost-and-found operations.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the Embedding Adapter or the model behind it.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The model could not be loaded (missing weights, bad endpoint, ...).
    #[error("Embedding model failed to load: {0}")]
    ModelLoad(String),

    /// Image format is not supported.
    #[error("Format not supported: {0}. Supported formats: PNG, JPG, GIF, WebP")]
    UnsupportedFormat(String),

    /// Bytes could not be decoded as an image.
    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    /// The model ran but inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The model returned a vector of the wrong length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model returned a zero or non-finite vector.
    #[error("Embedding model returned a degenerate vector")]
    Degenerate,
}

/// Errors raised by the Vector Store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this id already exists; records are never updated in place.
    #[error("Record already exists: {0}")]
    Duplicate(String),

    /// The store is full.
    #[error("Vector store capacity of {capacity} records exceeded")]
    CapacityExceeded { capacity: usize },

    /// The query or record vector has the wrong length.
    #[error("Vector dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Snapshot persistence failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Errors raised by a Blob Store.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The blob reference does not point at a stored blob.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The blob reference is malformed or escapes the store root.
    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    /// I/O error.
    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure.
    #[error("Blob backend error: {0}")]
    Backend(String),
}

/// Errors raised by the Auth Provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were supplied.
    #[error("Missing credentials")]
    MissingCredentials,

    /// Credentials were supplied but did not verify.
    #[error("Invalid credentials: {0}")]
    InvalidToken(String),

    /// Token could not be issued.
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Error classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input, nothing was attempted.
    Validation,
    /// Missing or invalid identity.
    Auth,
    /// Identity is valid but not allowed to act on the resource.
    Forbidden,
    /// Blob Store or Embedding Model failure.
    Upstream,
    /// Vector Store failure.
    Store,
    /// Unknown id.
    NotFound,
}

/// Top-level error for core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Requester may not perform the operation.
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Embedding failure.
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Blob Store failure.
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    /// Vector Store failure.
    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    /// Item does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// A background ingestion task panicked or was aborted.
    #[error("Ingestion interrupted: {0}")]
    Interrupted(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classify the error for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Config(_) => ErrorKind::Validation,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Embedding(EmbeddingError::UnsupportedFormat(_))
            | Error::Embedding(EmbeddingError::CorruptImage(_)) => ErrorKind::Validation,
            Error::Embedding(_) | Error::Blob(_) | Error::Interrupted(_) => ErrorKind::Upstream,
            Error::Store(_) => ErrorKind::Store,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Snapshot(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_classification() {
        let err = Error::from(BlobError::Backend("bucket offline".to_string()));
        assert_eq!(err.kind(), ErrorKind::Upstream);

        let err = Error::from(EmbeddingError::Inference("oom".to_string()));
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_bad_image_is_validation() {
        let err = Error::from(EmbeddingError::UnsupportedFormat("bmp".to_string()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_store_and_not_found() {
        let err = Error::from(StoreError::CapacityExceeded { capacity: 2 });
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(
            Error::NotFound("abc".to_string()).kind(),
            ErrorKind::NotFound
        );
    }
}
