//! Vector Store: (vector, metadata) records with cosine nearest-neighbour search.
//!
//! The store holds no business logic. Reads run concurrently; writes are
//! serialised and, when a snapshot path is configured, become visible only
//! after the snapshot containing them has been written.

use std::{
    cmp::Ordering,
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    models::{ItemId, ItemMetadata, ItemRecord, TopK},
};

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: ItemId,
    pub similarity: f32,
    pub metadata: ItemMetadata,
}

/// Storage + search primitive.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Vector length accepted by the store.
    fn dimension(&self) -> usize;

    /// Maximum number of records; the cap used for `TopK::All`.
    fn capacity(&self) -> usize;

    async fn len(&self) -> usize;

    /// Insert a complete record. Fails on duplicate ids.
    async fn insert(
        &self,
        id: ItemId,
        vector: Vec<f32>,
        metadata: ItemMetadata,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: &ItemId) -> Result<Option<ItemRecord>, StoreError>;

    /// Records with similarity >= `min_similarity`, best first, at most `top_k`.
    ///
    /// Ties are broken by insertion recency, most recent first.
    async fn search(
        &self,
        query: &[f32],
        top_k: TopK,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Remove a record. `Ok(None)` means there was no such record.
    async fn delete(&self, id: &ItemId) -> Result<Option<ItemRecord>, StoreError>;
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    record: ItemRecord,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ItemId, Entry>,
    next_seq: u64,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    next_seq: u64,
    entries: Vec<&'a Entry>,
}

#[derive(Deserialize)]
struct Snapshot {
    dimension: usize,
    next_seq: u64,
    entries: Vec<Entry>,
}

/// Brute-force in-memory store with optional JSON snapshot persistence.
pub struct MemoryVectorStore {
    inner: RwLock<Inner>,
    write_gate: tokio::sync::Mutex<()>,
    dimension: usize,
    capacity: usize,
    snapshot_path: Option<PathBuf>,
}

impl MemoryVectorStore {
    /// Empty, non-persistent store.
    pub fn new(dimension: usize, capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            write_gate: tokio::sync::Mutex::new(()),
            dimension,
            capacity,
            snapshot_path: None,
        }
    }

    /// Store backed by a snapshot file, loading it if it exists.
    pub fn open(
        dimension: usize,
        capacity: usize,
        snapshot_path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let snapshot_path = snapshot_path.into();
        let inner = if snapshot_path.exists() {
            Self::load_snapshot(&snapshot_path, dimension)?
        } else {
            Inner::default()
        };
        info!(
            "Vector store opened with {} records from {}",
            inner.entries.len(),
            snapshot_path.display()
        );
        Ok(Self {
            inner: RwLock::new(inner),
            write_gate: tokio::sync::Mutex::new(()),
            dimension,
            capacity,
            snapshot_path: Some(snapshot_path),
        })
    }

    fn load_snapshot(path: &Path, dimension: usize) -> Result<Inner, StoreError> {
        let bytes = std::fs::read(path)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.dimension != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: snapshot.dimension,
            });
        }
        let mut entries = HashMap::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries {
            if entry.record.embedding.len() != dimension {
                warn!(
                    "Snapshot {} holds a {}-dimension vector for {}",
                    path.display(),
                    entry.record.embedding.len(),
                    entry.record.id
                );
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.record.embedding.len(),
                });
            }
            entries.insert(entry.record.id.clone(), entry);
        }
        Ok(Inner {
            entries,
            next_seq: snapshot.next_seq,
        })
    }

    fn encode_snapshot<'a>(
        &self,
        next_seq: u64,
        entries: impl Iterator<Item = &'a Entry>,
    ) -> Result<Vec<u8>, StoreError> {
        let snapshot = SnapshotRef {
            dimension: self.dimension,
            next_seq,
            entries: entries.collect(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    async fn write_snapshot(&self, bytes: Vec<u8>) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        debug!("Snapshot written to {}", path.display());
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    async fn insert(
        &self,
        id: ItemId,
        vector: Vec<f32>,
        metadata: ItemMetadata,
    ) -> Result<(), StoreError> {
        self.check_dimension(&vector)?;
        let _writer = self.write_gate.lock().await;

        let entry = {
            let inner = self.inner.read();
            if inner.entries.contains_key(&id) {
                return Err(StoreError::Duplicate(id.to_string()));
            }
            if inner.entries.len() >= self.capacity {
                return Err(StoreError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
            Entry {
                seq: inner.next_seq,
                record: ItemRecord {
                    id: id.clone(),
                    embedding: vector,
                    metadata,
                },
            }
        };

        if self.snapshot_path.is_some() {
            let bytes = {
                let inner = self.inner.read();
                self.encode_snapshot(
                    entry.seq + 1,
                    inner.entries.values().chain(std::iter::once(&entry)),
                )?
            };
            self.write_snapshot(bytes).await?;
        }

        let mut inner = self.inner.write();
        inner.next_seq = entry.seq + 1;
        inner.entries.insert(id, entry);
        Ok(())
    }

    async fn get(&self, id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .entries
            .get(id)
            .map(|entry| entry.record.clone()))
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: TopK,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.check_dimension(query)?;
        let limit = top_k.resolve(self.capacity);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read();
        // filter before ranking so truncation never drops below the threshold
        let mut scored: Vec<(f32, &Entry)> = inner
            .entries
            .values()
            .filter_map(|entry| {
                let similarity = cosine_similarity(query, &entry.record.embedding);
                (similarity >= min_similarity).then_some((similarity, entry))
            })
            .collect();

        scored.sort_by(|(sim_a, a), (sim_b, b)| {
            sim_b
                .partial_cmp(sim_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(similarity, entry)| SearchHit {
                id: entry.record.id.clone(),
                similarity,
                metadata: entry.record.metadata.clone(),
            })
            .collect())
    }

    async fn delete(&self, id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        let _writer = self.write_gate.lock().await;

        if self.snapshot_path.is_some() {
            let bytes = {
                let inner = self.inner.read();
                if !inner.entries.contains_key(id) {
                    return Ok(None);
                }
                self.encode_snapshot(
                    inner.next_seq,
                    inner.entries.values().filter(|entry| &entry.record.id != id),
                )?
            };
            self.write_snapshot(bytes).await?;
        }

        Ok(self
            .inner
            .write()
            .entries
            .remove(id)
            .map(|entry| entry.record))
    }
}
