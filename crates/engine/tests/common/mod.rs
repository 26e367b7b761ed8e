//! Shared fixture for engine integration tests
//!
//! Wires the uploader, monitor and coordinator to the in-memory checkpoint
//! backend and the in-memory object store, with retries that never sleep.

#![allow(dead_code)]

use engine::{path_key, ChunkUploader, CompletionMonitor, IngestCoordinator, PathLocks};
use journal::{CheckpointStore, MemoryBackend};
use objstore::MemoryObjectStore;
use sd_core::RetryPolicy;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use watcher::SuffixFilter;

pub struct Harness {
    pub dir: TempDir,
    pub backend: MemoryBackend,
    pub checkpoints: Arc<CheckpointStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub locks: Arc<PathLocks>,
    pub uploader: Arc<ChunkUploader>,
    pub monitor: CompletionMonitor,
}

impl Harness {
    pub fn new(chunk_size: u64, timeout: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let checkpoints = Arc::new(
            CheckpointStore::new(Arc::new(backend.clone()), timeout * 2)
                .with_retry(RetryPolicy::immediate(3), RetryPolicy::immediate(5)),
        );
        let objects = Arc::new(MemoryObjectStore::new());
        let locks = Arc::new(PathLocks::new());
        let uploader = Arc::new(
            ChunkUploader::new(objects.clone(), checkpoints.clone(), locks.clone(), chunk_size)
                .with_retry(RetryPolicy::immediate(5)),
        );
        let monitor = CompletionMonitor::new(
            checkpoints.clone(),
            objects.clone(),
            locks.clone(),
            chunk_size,
            timeout,
            Duration::from_secs(30),
        );

        Self {
            dir,
            backend,
            checkpoints,
            objects,
            locks,
            uploader,
            monitor,
        }
    }

    pub fn coordinator(&self, purge_on_delete: bool) -> IngestCoordinator {
        IngestCoordinator::new(
            self.uploader.clone(),
            self.checkpoints.clone(),
            SuffixFilter::new(".mp4"),
        )
        .purge_on_delete(purge_on_delete)
    }

    /// Create a file and return its canonical path
    pub fn write(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.canonicalize().unwrap()
    }

    pub fn append(&self, path: &Path, content: &[u8]) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(content).unwrap();
    }

    pub fn key(&self, path: &Path) -> String {
        path_key(path)
    }

    /// Pretend the last upload activity happened `secs` ago
    pub async fn age(&self, path: &Path, secs: f64) -> f64 {
        let now = sd_core::epoch_secs();
        self.checkpoints
            .set_last_activity(&self.key(path), now - secs)
            .await
            .unwrap();
        now
    }
}
