//! Deletion Coordinator: remove a record and its blob.
//!
//! The Vector Store entry goes first so the item is unsearchable before its
//! image disappears. A blob that cannot be removed afterwards is logged as
//! orphaned; the deletion still succeeds.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    auth::Identity,
    blob::{file_name_from_url, BlobStore},
    error::{BlobError, Error, Result},
    models::{ItemId, Owner},
    store::VectorStore,
};

/// Result of a successful deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    pub item_id: ItemId,
    /// False when the blob was already gone or could not be removed.
    pub blob_removed: bool,
}

/// Whether `requester` may delete an item owned by `owner`.
pub fn authorize(owner: &Owner, requester: &Identity) -> Result<()> {
    if owner.subject == requester.subject || requester.role.can_moderate() {
        return Ok(());
    }
    Err(Error::Forbidden(format!(
        "{} may not delete items submitted by someone else",
        requester.email
    )))
}

pub struct DeletionCoordinator {
    store: Arc<dyn VectorStore>,
    blobs: Arc<dyn BlobStore>,
}

impl DeletionCoordinator {
    pub fn new(store: Arc<dyn VectorStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub async fn delete(&self, id: &ItemId, requester: &Identity) -> Result<DeletionOutcome> {
        self.delete_with_file_name(id, None, requester).await
    }

    /// Delete, optionally checking the caller's idea of the blob file name.
    ///
    /// The record's own blob reference is authoritative; a mismatching
    /// `file_name` is rejected before anything is removed.
    pub async fn delete_with_file_name(
        &self,
        id: &ItemId,
        file_name: Option<&str>,
        requester: &Identity,
    ) -> Result<DeletionOutcome> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        authorize(&record.metadata.submitter, requester)?;

        let image_url = record.metadata.image_url;
        if let Some(expected) = file_name.filter(|name| !name.is_empty()) {
            if file_name_from_url(&image_url) != Some(expected) {
                return Err(Error::Validation(format!(
                    "file name {expected} does not belong to item {id}"
                )));
            }
        }

        if self.store.delete(id).await?.is_none() {
            // removed concurrently between lookup and delete
            return Err(Error::NotFound(id.to_string()));
        }
        info!("Deleted item {} for {}", id, requester.subject);

        let blob_removed = match self.blobs.delete(&image_url).await {
            Ok(()) => true,
            Err(BlobError::NotFound(_)) => {
                debug!("Blob {} for {} was already gone", image_url, id);
                false
            }
            Err(e) => {
                warn!("Orphaned blob {} after deleting {}: {}", image_url, id, e);
                false
            }
        };

        Ok(DeletionOutcome {
            item_id: id.clone(),
            blob_removed,
        })
    }
}
