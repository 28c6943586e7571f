//! Persistence coordination across the metadata and image stores.
//!
//! Every mutation follows the same order: image-side effects are issued
//! and awaited first, then the in-memory collection changes, then the whole
//! collection is written to the metadata store. A crash between the two
//! stores can therefore only leave an unreferenced image behind, never a
//! record pointing at an image this operation failed to write.
//!
//! Image failures during create and update are logged and the record is
//! saved without the new image. Metadata failures always reach the caller;
//! the in-memory collection is not rolled back.

use std::collections::HashSet;
use std::sync::Arc;

use talqena_db::{new_staging_id, now_millis, BlobStore, MetadataStore, PromptRecord, StoreError};
use talqena_rewrite::Rewriter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::draft::{ImageField, PromptDraft};
use crate::error::{LibraryError, Result};
use crate::filter::{available_tags, filter_prompts, PromptFilter};
use crate::handles::{ImageHandle, RecordHandles};
use crate::import::{build_import_batch, parse_import_lines};
use crate::ImportOptions;

/// Default upper bound for an attached image.
pub const MAX_IMAGE_SIZE_BYTES: usize = 500 * 1024;

/// Runtime settings for a [`Library`].
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub max_image_bytes: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: MAX_IMAGE_SIZE_BYTES,
        }
    }
}

/// The prompt collection together with the stores that persist it.
pub struct Library {
    metadata: MetadataStore,
    blobs: Arc<BlobStore>,
    records: Vec<PromptRecord>,
    handles: RecordHandles,
    staged: HashSet<String>,
    config: LibraryConfig,
    /// Set while the stored collection could not be read. The in-memory
    /// collection then says nothing about which images are live.
    sweep_blocked: bool,
}

impl Library {
    /// Load the collection, acquire handles for its images and sweep
    /// orphaned images left by earlier partial failures.
    ///
    /// A stored collection that cannot be read opens as empty, and the
    /// sweep is held back until a successful write replaces it.
    pub async fn open(metadata: MetadataStore, blobs: Arc<BlobStore>, config: LibraryConfig) -> Self {
        let (records, sweep_blocked) = match metadata.load_checked() {
            Ok(records) => (records, false),
            Err(e) => {
                warn!(error = %e, "Stored prompts are unreadable, starting empty");
                (Vec::new(), true)
            }
        };
        let mut handles = RecordHandles::new();

        for record in records.iter().filter(|r| r.has_image()) {
            match blobs.get(&record.id).await {
                Ok(Some(blob)) => {
                    handles.attach(&record.id, blob);
                }
                Ok(None) => warn!(id = %record.id, "Image missing for prompt"),
                Err(StoreError::BlobStoreUnavailable(e)) => {
                    warn!(error = %e, "Image store unavailable, showing prompts without images");
                    break;
                }
                Err(e) => warn!(id = %record.id, error = %e, "Failed to load image"),
            }
        }

        info!(
            prompts = records.len(),
            images = handles.live_count(),
            "Opened library"
        );

        let library = Self {
            metadata,
            blobs,
            records,
            handles,
            staged: HashSet::new(),
            config,
            sweep_blocked,
        };

        if sweep_blocked {
            warn!("Skipping orphaned image cleanup until the prompt collection is saved again");
        } else if let Err(e) = library.reconcile().await {
            warn!(error = %e, "Orphaned image cleanup failed");
        }

        library
    }

    /// The full collection, newest first.
    pub fn records(&self) -> &[PromptRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&PromptRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records visible under `filter`, in collection order.
    pub fn filtered(&self, filter: &PromptFilter) -> Vec<&PromptRecord> {
        filter_prompts(&self.records, filter)
    }

    pub fn available_tags(&self) -> Vec<String> {
        available_tags(&self.records)
    }

    pub fn image_handle(&self, id: &str) -> Option<&ImageHandle> {
        self.handles.handle_for(id)
    }

    pub fn resolve_handle(&self, handle: &ImageHandle) -> Option<&[u8]> {
        self.handles.resolve(handle)
    }

    /// Upload an image ahead of the record that will own it.
    ///
    /// Returns the staging id to put in [`ImageField::Staged`].
    pub async fn stage_image(&mut self, payload: Vec<u8>) -> Result<String> {
        if payload.len() > self.config.max_image_bytes {
            return Err(LibraryError::ImageTooLarge {
                size: payload.len(),
                limit: self.config.max_image_bytes,
            });
        }

        let staging_id = new_staging_id();
        self.blobs.save(&staging_id, payload).await?;
        self.staged.insert(staging_id.clone());
        debug!(staging_id = %staging_id, "Staged image");
        Ok(staging_id)
    }

    /// Drop a staged image that will not be saved.
    pub async fn discard_staged(&mut self, staging_id: &str) -> Result<()> {
        self.staged.remove(staging_id);
        self.blobs.delete(staging_id).await?;
        Ok(())
    }

    /// Create a prompt from `draft`, promoting its staged image if any.
    pub async fn create(&mut self, draft: PromptDraft) -> Result<PromptRecord> {
        let id = Uuid::new_v4().to_string();

        let attached = match draft.image {
            ImageField::Staged(ref staging_id) => self.promote(staging_id, &id).await,
            ImageField::Keep | ImageField::Remove => None,
        };

        let now = now_millis();
        let record = PromptRecord {
            id: id.clone(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            description: draft.normalized_description(),
            category: draft.category,
            model: draft.model,
            tags: draft.tags.clone(),
            image_ref: attached.is_some().then(|| id.clone()),
            created_at: now,
            updated_at: now,
            is_favorite: draft.is_favorite,
        };

        self.records.insert(0, record.clone());
        if let Some(blob) = attached {
            self.handles.attach(&id, blob);
        }

        info!(id = %id, has_image = record.has_image(), "Created prompt");
        self.persist()?;
        Ok(record)
    }

    /// Replace the fields of prompt `id` with `draft`, keeping its position.
    pub async fn update(&mut self, id: &str, draft: PromptDraft) -> Result<PromptRecord> {
        let had_image = self
            .get(id)
            .map(|r| r.has_image())
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;

        let mut image_ref = had_image.then(|| id.to_string());
        match draft.image {
            ImageField::Keep => {}
            ImageField::Staged(ref staging_id) => {
                if let Some(blob) = self.promote(staging_id, id).await {
                    image_ref = Some(id.to_string());
                    self.handles.attach(id, blob);
                }
            }
            ImageField::Remove => {
                if had_image {
                    if let Err(e) = self.blobs.delete(id).await {
                        warn!(id = %id, error = %e, "Failed to delete removed image");
                    }
                    self.handles.detach(id);
                }
                image_ref = None;
            }
        }

        let now = now_millis();
        let position = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;

        let record = &mut self.records[position];
        record.title = draft.title.clone();
        record.content = draft.content.clone();
        record.description = draft.normalized_description();
        record.category = draft.category;
        record.model = draft.model;
        record.tags = draft.tags.clone();
        record.is_favorite = draft.is_favorite;
        record.image_ref = image_ref;
        record.updated_at = now.max(record.updated_at);
        let updated = record.clone();

        info!(id = %id, has_image = updated.has_image(), "Updated prompt");
        self.persist()?;
        Ok(updated)
    }

    /// Delete prompt `id` and its image. Returns whether a prompt was removed.
    pub async fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(position) = self.records.iter().position(|r| r.id == id) else {
            debug!(id = %id, "Delete of unknown prompt");
            return Ok(false);
        };

        if let Err(e) = self.blobs.delete(id).await {
            warn!(id = %id, error = %e, "Failed to delete image, leaving it for cleanup");
        }

        self.records.remove(position);
        self.handles.detach(id);

        info!(id = %id, remaining = self.records.len(), "Deleted prompt");
        self.persist()?;
        Ok(true)
    }

    /// Delete every prompt and every stored image. Returns the number of
    /// prompts removed.
    pub async fn delete_all(&mut self) -> Result<usize> {
        match self.blobs.list_ids().await {
            Ok(ids) => {
                for blob_id in &ids {
                    if let Err(e) = self.blobs.delete(blob_id).await {
                        warn!(id = %blob_id, error = %e, "Failed to delete image");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to list images for deletion"),
        }
        self.staged.clear();

        self.metadata.clear()?;
        self.sweep_blocked = false;

        let removed = self.records.len();
        self.records.clear();
        let released = self.handles.teardown();

        info!(removed, released, "Deleted all prompts");
        Ok(removed)
    }

    /// Import one prompt per non-empty line of `raw_text`, ahead of the
    /// existing collection. Returns the number of prompts imported.
    pub fn bulk_import(&mut self, raw_text: &str, options: &ImportOptions) -> Result<usize> {
        let lines = parse_import_lines(raw_text);
        if lines.is_empty() {
            return Err(LibraryError::ImportEmpty);
        }

        let batch = build_import_batch(&lines, options, now_millis());
        let count = batch.len();
        self.records.splice(0..0, batch);

        info!(count, category = %options.category, "Imported prompts");
        self.persist()?;
        Ok(count)
    }

    /// Flip the favorite flag of prompt `id`. Returns the new value.
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;

        record.is_favorite = !record.is_favorite;
        let favorite = record.is_favorite;

        self.persist()?;
        Ok(favorite)
    }

    /// Delete images no current prompt or pending upload refers to.
    ///
    /// Does nothing while the stored collection is unreadable.
    pub async fn reconcile(&self) -> Result<usize> {
        if self.sweep_blocked {
            warn!("Stored prompts are unreadable, not removing any images");
            return Ok(0);
        }

        let mut live: HashSet<String> = self
            .records
            .iter()
            .filter_map(|r| r.image_ref.clone())
            .collect();
        live.extend(self.staged.iter().cloned());

        Ok(self.blobs.cleanup_orphans(&live).await?)
    }

    /// Ask `rewriter` for an improved version of `content`.
    ///
    /// An empty answer returns `content` unchanged. Nothing is persisted.
    pub async fn enhance(&self, rewriter: &dyn Rewriter, content: &str) -> Result<String> {
        match rewriter.rewrite(content).await {
            Ok(text) if text.trim().is_empty() => Ok(content.to_string()),
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(rewriter = rewriter.name(), error = %e, "Rewrite failed");
                Err(LibraryError::ExternalService(e))
            }
        }
    }

    /// Release every display handle.
    pub fn close(mut self) {
        let released = self.handles.teardown();
        debug!(released, "Closed library");
    }

    /// Copy the staged image to `target`, then remove the staging entry.
    ///
    /// Returns the image bytes on success. Failures are logged and yield
    /// `None`; a staging entry left behind is reclaimed by [`Self::reconcile`].
    async fn promote(&mut self, staging_id: &str, target: &str) -> Option<Vec<u8>> {
        self.staged.remove(staging_id);

        let blob = match self.blobs.get(staging_id).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                warn!(staging_id = %staging_id, "Staged image not found");
                return None;
            }
            Err(e) => {
                warn!(staging_id = %staging_id, error = %e, "Failed to read staged image");
                return None;
            }
        };

        if let Err(e) = self.blobs.save(target, blob.clone()).await {
            warn!(id = %target, error = %e, "Failed to save image");
            return None;
        }

        if let Err(e) = self.blobs.delete(staging_id).await {
            warn!(staging_id = %staging_id, error = %e, "Failed to remove staged image");
        }

        debug!(staging_id = %staging_id, id = %target, "Promoted staged image");
        Some(blob)
    }

    /// Write the collection, or clear the key when it is empty.
    fn persist(&mut self) -> Result<()> {
        let live: HashSet<&str> = self
            .records
            .iter()
            .filter(|r| r.has_image())
            .map(|r| r.id.as_str())
            .collect();
        self.handles.retain(|id| live.contains(id));

        if self.records.is_empty() {
            self.metadata.clear()?;
        } else {
            self.metadata.save(&self.records)?;
        }
        self.sweep_blocked = false;
        Ok(())
    }
}
