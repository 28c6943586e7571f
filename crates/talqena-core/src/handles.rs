//! Ephemeral display handles for stored images.
//!
//! A handle is a process-local reference to image bytes, never persisted.
//! [`HandleLifecycle`] issues and revokes handles; [`RecordHandles`] ties
//! at most one live handle to each record in the working set so that a
//! handle is released exactly once when its record's image is replaced,
//! removed, or the working set goes away.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Opaque reference to an image held in memory for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle(String);

impl ImageHandle {
    fn fresh() -> Self {
        Self(format!("blob:talqena/{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues and revokes image handles.
#[derive(Debug, Default)]
pub struct HandleLifecycle {
    live: HashMap<ImageHandle, Arc<[u8]>>,
}

impl HandleLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new handle for `blob`. Every call yields a distinct handle.
    pub fn acquire(&mut self, blob: impl Into<Arc<[u8]>>) -> ImageHandle {
        let handle = ImageHandle::fresh();
        self.live.insert(handle.clone(), blob.into());
        handle
    }

    /// Invalidate `handle`. Returns false if it was not live.
    pub fn release(&mut self, handle: &ImageHandle) -> bool {
        self.live.remove(handle).is_some()
    }

    pub fn resolve(&self, handle: &ImageHandle) -> Option<&[u8]> {
        self.live.get(handle).map(|blob| blob.as_ref())
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// One handle per record in the current working set.
#[derive(Debug, Default)]
pub struct RecordHandles {
    lifecycle: HandleLifecycle,
    by_record: HashMap<String, ImageHandle>,
}

impl RecordHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `record_id` a handle for `blob`, releasing the one it had.
    pub fn attach(&mut self, record_id: &str, blob: Vec<u8>) -> ImageHandle {
        let handle = self.lifecycle.acquire(blob);
        if let Some(previous) = self.by_record.insert(record_id.to_string(), handle.clone()) {
            self.lifecycle.release(&previous);
        }
        debug!(id = %record_id, handle = %handle, "Attached image handle");
        handle
    }

    /// Release the handle held for `record_id`, if any.
    pub fn detach(&mut self, record_id: &str) -> bool {
        match self.by_record.remove(record_id) {
            Some(handle) => {
                self.lifecycle.release(&handle);
                debug!(id = %record_id, "Released image handle");
                true
            }
            None => false,
        }
    }

    pub fn handle_for(&self, record_id: &str) -> Option<&ImageHandle> {
        self.by_record.get(record_id)
    }

    pub fn resolve(&self, handle: &ImageHandle) -> Option<&[u8]> {
        self.lifecycle.resolve(handle)
    }

    /// Release handles of records for which `keep` returns false.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let dropped: Vec<String> = self
            .by_record
            .keys()
            .filter(|id| !keep(id.as_str()))
            .cloned()
            .collect();

        for id in &dropped {
            self.detach(id);
        }
        dropped.len()
    }

    /// Release every handle.
    pub fn teardown(&mut self) -> usize {
        let count = self.by_record.len();
        for (_, handle) in self.by_record.drain() {
            self.lifecycle.release(&handle);
        }
        count
    }

    pub fn live_count(&self) -> usize {
        self.lifecycle.live_count()
    }
}
