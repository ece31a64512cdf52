//! In-memory gallery cache.
//!
//! Owned by whoever composes the service (the engine thread), never a
//! global. Refreshed wholesale after every enrollment change; readers may
//! briefly see a snapshot that lags the store.

use rollcall_core::Gallery;
use rollcall_store::{AttendanceStore, StoreError};
use std::sync::Arc;

/// Backing store a gallery snapshot is read from.
pub trait GallerySource {
    type Error;

    fn load_gallery(&self) -> Result<Gallery, Self::Error>;
}

impl GallerySource for AttendanceStore {
    type Error = StoreError;

    fn load_gallery(&self) -> Result<Gallery, StoreError> {
        AttendanceStore::load_gallery(self)
    }
}

#[derive(Debug, Default)]
pub struct GalleryCache {
    snapshot: Option<Arc<Gallery>>,
}

impl GalleryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, reading from `source` only if nothing is cached.
    pub fn load<S: GallerySource>(&mut self, source: &S) -> Result<Arc<Gallery>, S::Error> {
        if let Some(snapshot) = &self.snapshot {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(source.load_gallery()?);
        tracing::debug!(faces = snapshot.len(), "gallery cache loaded");
        self.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the cached snapshot and reload it from `source`.
    pub fn refresh<S: GallerySource>(&mut self, source: &S) -> Result<Arc<Gallery>, S::Error> {
        self.clear();
        self.load(source)
    }

    pub fn clear(&mut self) {
        if let Some(old) = self.snapshot.take() {
            tracing::debug!(faces = old.len(), "gallery cache cleared");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }
}
