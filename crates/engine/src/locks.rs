//! Per-path upload guard
//!
//! The offset read-modify-write in the uploader is not atomic in the
//! checkpoint store, so at most one task may upload (or finalize) a given
//! path at a time.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard held while a path is being worked on
pub type PathGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct PathLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex(&self, path: &Path) -> Arc<Mutex<()>> {
        // Clone out so no map shard stays locked while waiting
        Arc::clone(self.locks.entry(path.to_path_buf()).or_default().value())
    }

    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &Path) -> PathGuard {
        self.mutex(path).lock_owned().await
    }

    /// Exclusive access to `path` if nobody holds it
    pub fn try_lock(&self, path: &Path) -> Option<PathGuard> {
        self.mutex(path).try_lock_owned().ok()
    }

    /// Forget paths nobody holds or waits for
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
