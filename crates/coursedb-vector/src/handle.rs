//! Lazily loaded, self-refreshing view of a persisted index.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use coursedb_core::Result;

use crate::index::VectorIndex;
use crate::store;

struct Cached {
    index: Arc<VectorIndex>,
    modified: Option<SystemTime>,
}

/// Cache of the index stored at one path.
///
/// Nothing is read until the first [`IndexHandle::get`]. Later calls reuse
/// the loaded index until the bundle's modification time changes or
/// [`IndexHandle::invalidate`] is called.
pub struct IndexHandle {
    path: PathBuf,
    cached: RwLock<Option<Cached>>,
}

impl IndexHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cached: RwLock::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Result<Arc<VectorIndex>> {
        let modified = store::bundle_modified(&self.path);
        if let Some(index) = self.current(modified) {
            return Ok(index);
        }
        tracing::debug!("Loading index from {}", self.path.display());
        let index = Arc::new(store::load(&self.path).await?);
        *self.cached.write() = Some(Cached { index: Arc::clone(&index), modified });
        Ok(index)
    }

    fn current(&self, modified: Option<SystemTime>) -> Option<Arc<VectorIndex>> {
        let cached = self.cached.read();
        cached.as_ref().filter(|c| c.modified == modified).map(|c| Arc::clone(&c.index))
    }

    /// Drop the cached index; the next `get` reloads from disk.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.cached.read().is_some()
    }
}
