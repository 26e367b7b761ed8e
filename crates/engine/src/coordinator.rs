//! File change reactions
//!
//! Create/modify notifications for matching files drive the uploader;
//! delete notifications are logged and optionally purge the checkpoint.
//! Bursts of events for one path coalesce: while an upload runs, further
//! events only mark the path dirty and the running task goes around once
//! more when it finishes.

use crate::path_key;
use crate::uploader::ChunkUploader;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use journal::CheckpointStore;
use objstore::ObjectStoreError;
use sd_core::{Manifest, StreamId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use watcher::{FileChangeHandler, FileEvent, FileEventKind, SuffixFilter};

pub struct IngestCoordinator {
    uploader: Arc<ChunkUploader>,
    checkpoints: Arc<CheckpointStore>,
    filter: SuffixFilter,
    purge_on_delete: bool,
    /// Paths with a running upload task; `true` = another event arrived meanwhile
    in_flight: DashMap<PathBuf, bool>,
}

impl IngestCoordinator {
    pub fn new(
        uploader: Arc<ChunkUploader>,
        checkpoints: Arc<CheckpointStore>,
        filter: SuffixFilter,
    ) -> Self {
        Self {
            uploader,
            checkpoints,
            filter,
            purge_on_delete: false,
            in_flight: DashMap::new(),
        }
    }

    /// Purge a file's checkpoint record when its delete notification arrives
    pub fn purge_on_delete(mut self, purge: bool) -> Self {
        self.purge_on_delete = purge;
        self
    }

    /// Upload a path, coalescing with an upload already running for it
    pub async fn ingest(&self, path: PathBuf) {
        match self.in_flight.entry(path.clone()) {
            Entry::Occupied(mut running) => {
                *running.get_mut() = true;
                debug!(path = %path.display(), "Upload already running, coalescing");
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(false);
            }
        }

        loop {
            self.process(&path).await;

            let again = match self.in_flight.entry(path.clone()) {
                Entry::Occupied(mut running) if *running.get() => {
                    *running.get_mut() = false;
                    true
                }
                Entry::Occupied(running) => {
                    running.remove();
                    false
                }
                Entry::Vacant(_) => false,
            };
            if !again {
                break;
            }
        }
    }

    async fn process(&self, path: &Path) {
        let key = path_key(path);
        let _guard = self.uploader.locks().lock(path).await;

        match self.is_finalized(path, &key).await {
            Ok(true) => {
                debug!(path = %path.display(), "Already finalized, skipping");
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not check manifest"),
        }

        if let Err(e) = self.uploader.upload_locked(path).await {
            error!(path = %path.display(), error = %e, "Failed processing event");
            return;
        }

        if let Err(e) = self.checkpoints.touch_activity(&key).await {
            error!(path = %path.display(), error = %e, "Failed to record activity");
        }
    }

    /// Untracked file whose stored manifest already covers its current size
    async fn is_finalized(&self, path: &Path, key: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        if self.checkpoints.get_stream_id(key).await?.is_some() {
            return Ok(false);
        }

        let size = tokio::fs::metadata(path).await?.len();
        let manifest_key = StreamId::for_path(key).manifest_key();
        let body = match self.uploader.objects().get_object(&manifest_key).await {
            Ok(body) => body,
            Err(ObjectStoreError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&body)?;
        Ok(manifest.file_size == size)
    }

    async fn handle_delete(&self, path: &Path) {
        info!(path = %path.display(), "File deleted");
        if !self.purge_on_delete || !self.filter.matches(path) {
            return;
        }

        let key = path_key(path);
        let _guard = self.uploader.locks().lock(path).await;
        match self.checkpoints.remove(&key).await {
            Ok(()) => info!(path = %path.display(), "Purged checkpoint for deleted file"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to purge checkpoint"),
        }
    }
}

#[async_trait]
impl FileChangeHandler for IngestCoordinator {
    async fn on_file_changed(&self, event: FileEvent) {
        if event.kind == FileEventKind::Deleted {
            self.handle_delete(&event.path).await;
            return;
        }

        if !self.filter.accepts(&event) {
            debug!(path = %event.path.display(), "Ignoring event");
            return;
        }

        let path = match tokio::fs::canonicalize(&event.path).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %event.path.display(), "File vanished before upload");
                return;
            }
            Err(e) => {
                error!(path = %event.path.display(), error = %e, "Cannot resolve path");
                return;
            }
        };

        debug!(path = %path.display(), kind = ?event.kind, "File event");
        self.ingest(path).await;
    }
}
