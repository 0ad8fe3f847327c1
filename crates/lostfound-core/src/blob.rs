//! Blob Store: durable storage for raw item images.
//!
//! Blobs are addressed by the URL returned from [`BlobStore::put`]. File
//! names are `{item_id}.{ext}` so every blob is attributable to an item.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::{error::BlobError, formats::ImageFormat, models::ItemId};

/// Storage collaborator for item images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `file_name` and return the public URL.
    async fn put(
        &self,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError>;

    /// Fetch the bytes behind a URL returned by `put`.
    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError>;

    /// Remove a blob. Removing a missing blob is `BlobError::NotFound`.
    async fn delete(&self, url: &str) -> Result<(), BlobError>;
}

/// Blob file name for an item image.
pub fn blob_file_name(id: &ItemId, format: ImageFormat) -> String {
    format!("{}.{}", id, format.extension())
}

/// Last path segment of a blob URL.
pub fn file_name_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

fn check_file_name(file_name: &str) -> Result<(), BlobError> {
    let path = Path::new(file_name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(BlobError::InvalidReference(file_name.to_string())),
    }
}

fn join_url(prefix: &str, file_name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), file_name)
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    /// Create the store, creating `root` if needed.
    pub async fn new(
        root: impl Into<PathBuf>,
        public_prefix: impl Into<String>,
    ) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_prefix: public_prefix.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    fn path_for_url(&self, url: &str) -> Result<PathBuf, BlobError> {
        let prefix = self.public_prefix.trim_end_matches('/');
        let file_name = url
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BlobError::InvalidReference(url.to_string()))?;
        check_file_name(file_name)?;
        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError> {
        check_file_name(file_name)?;
        let path = self.root.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(
            "Stored {} ({} bytes, {}) at {}",
            file_name,
            bytes.len(),
            content_type,
            path.display()
        );
        Ok(join_url(&self.public_prefix, file_name))
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for_url(url)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(url.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let path = self.path_for_url(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed blob {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(url.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store for tests and development.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
    public_prefix: String,
}

impl MemoryBlobStore {
    pub fn new(public_prefix: impl Into<String>) -> Self {
        Self {
            blobs: DashMap::new(),
            public_prefix: public_prefix.into(),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Whether a blob with this file name exists.
    pub fn contains_file(&self, file_name: &str) -> bool {
        self.blobs
            .contains_key(&join_url(&self.public_prefix, file_name))
    }

    /// Content type recorded for a URL.
    pub fn content_type(&self, url: &str) -> Option<String> {
        self.blobs.get(url).map(|entry| entry.0.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError> {
        check_file_name(file_name)?;
        let url = join_url(&self.public_prefix, file_name);
        self.blobs
            .insert(url.clone(), (content_type.to_string(), bytes.to_vec()));
        Ok(url)
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .get(url)
            .map(|entry| entry.1.clone())
            .ok_or_else(|| BlobError::NotFound(url.to_string()))
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        self.blobs
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(url.to_string()))
    }
}
