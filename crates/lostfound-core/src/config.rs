//! Configuration for the lost-and-found service.
//!
//! Layering (highest to lowest priority):
//! 1. Environment variables, `LOSTFOUND__<SECTION>__<KEY>`
//! 2. Optional TOML file (`lostfound.toml` or an explicit path)
//! 3. Built-in defaults (`#[serde(default)]` on every section)

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    models::TopK,
};

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lostfound.toml";

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "LOSTFOUND";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LostFoundConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub blob: BlobConfig,
    pub search: SearchConfig,
    pub status: StatusConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (host:port).
    pub bind: String,
    /// Maximum request body size in bytes (uploads included).
    pub max_body_bytes: usize,
    /// Return from `/upload` before the embedding is computed.
    pub async_ingest: bool,
}

/// Which embedding backend to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// External embedding service over HTTP.
    Remote,
    /// In-process CLIP model (requires the `local-embeddings` feature).
    Local,
}

/// Embedding Adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Base URL of the remote embedding service.
    pub endpoint: String,
    pub timeout_seconds: u64,
    /// Expected vector length.
    pub dimension: usize,
    /// Images are downscaled so neither side exceeds this many pixels.
    pub max_image_dimension: u32,
    /// Model cache directory for the local backend.
    pub cache_dir: Option<PathBuf>,
}

/// Vector Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of records; also the cap for `top_k = "all"`.
    pub capacity: usize,
    /// JSON snapshot written after every mutation when set.
    pub snapshot_path: Option<PathBuf>,
}

/// Blob Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Directory holding stored images.
    pub root: PathBuf,
    /// URL prefix under which blobs are served.
    pub public_prefix: String,
}

/// Search defaults applied when a request omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_min_similarity: f32,
    pub default_top_k: TopK,
}

/// Status Tracker retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// How long a terminal entry stays visible.
    pub grace_seconds: u64,
    /// Entries polled more often than this are pruned.
    pub max_poll_attempts: u32,
    /// Entries still pending or processing this long after creation are pruned.
    pub max_lifetime_seconds: u64,
    /// Interval of the background prune task.
    pub prune_interval_seconds: u64,
}

/// Auth Provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub leeway_seconds: u64,
    /// Lifetime of tokens minted by [`crate::auth::JwtIdentityProvider::issue`].
    pub token_ttl_seconds: i64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error.
    pub level: String,
    /// Include targets, thread ids and source locations.
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024, // 10 MB
            async_ingest: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Remote,
            endpoint: "http://127.0.0.1:9000".to_string(),
            timeout_seconds: 60,
            dimension: 512,
            max_image_dimension: 512,
            cache_dir: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            snapshot_path: None,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/images"),
            public_prefix: "/images".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_min_similarity: 0.5,
            default_top_k: TopK::Limit(10),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            grace_seconds: 300,
            max_poll_attempts: 150,
            max_lifetime_seconds: 3600,
            prune_interval_seconds: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: Some("lostfound".to_string()),
            leeway_seconds: 30,
            token_ttl_seconds: 24 * 3600,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl LostFoundConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// When `path` is `None`, `lostfound.toml` in the working directory is
    /// used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: LostFoundConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.capacity == 0 {
            return Err(Error::Validation(
                "store.capacity must be greater than 0".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Validation(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }
        if self.embedding.max_image_dimension == 0 {
            return Err(Error::Validation(
                "embedding.max_image_dimension must be greater than 0".to_string(),
            ));
        }
        let similarity = self.search.default_min_similarity;
        if !(-1.0..=1.0).contains(&similarity) {
            return Err(Error::Validation(format!(
                "search.default_min_similarity {similarity} outside [-1, 1]"
            )));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(Error::Validation(
                "auth.jwt_secret must be set".to_string(),
            ));
        }
        if self.status.max_lifetime_seconds == 0 {
            return Err(Error::Validation(
                "status.max_lifetime_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::Validation(
                "server.max_body_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
