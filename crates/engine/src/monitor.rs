//! Stream completion monitor
//!
//! Polls every tracked path on a fixed interval, independent of file
//! notifications. A stream is complete when its file exists, every byte is
//! confirmed uploaded and no upload activity happened for the inactivity
//! timeout. Complete streams get a manifest; the checkpoint record is
//! removed only after the manifest is stored.

use crate::error::FinalizeError;
use crate::locks::PathLocks;
use journal::{CheckpointError, CheckpointStore, StreamRecord};
use objstore::{ObjectStore, PutObject};
use sd_core::{epoch_secs, parse_chunk_index, Manifest};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The completion predicate
///
/// `file_size` is `None` when the file no longer exists; such streams are
/// never complete here.
pub fn is_stream_complete(
    file_size: Option<u64>,
    offset: u64,
    last_activity: f64,
    now: f64,
    timeout: Duration,
) -> bool {
    let Some(size) = file_size else {
        return false;
    };
    offset >= size && now - last_activity >= timeout.as_secs_f64()
}

/// Where a tracked stream stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Source file is gone
    Missing,
    /// Bytes on disk not yet confirmed uploaded
    Uploading,
    /// Fully uploaded but active within the timeout
    Idle,
    Complete,
}

/// One stream evaluated at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatus {
    pub record: StreamRecord,
    pub file_size: Option<u64>,
    pub idle_secs: f64,
    pub state: StreamState,
}

/// Result of a finalization
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub manifest: Manifest,
    /// False when the file grew after the manifest was built
    pub record_cleared: bool,
}

/// Summary of one poll cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonitorReport {
    pub checked: usize,
    pub finalized: Vec<String>,
    /// Paths skipped because an upload held them
    pub busy: usize,
    pub failed: usize,
}

pub struct CompletionMonitor {
    checkpoints: Arc<CheckpointStore>,
    objects: Arc<dyn ObjectStore>,
    locks: Arc<PathLocks>,
    /// Chunk size the uploader writes with
    chunk_size: u64,
    timeout: Duration,
    poll_interval: Duration,
}

impl CompletionMonitor {
    pub fn new(
        checkpoints: Arc<CheckpointStore>,
        objects: Arc<dyn ObjectStore>,
        locks: Arc<PathLocks>,
        chunk_size: u64,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            checkpoints,
            objects,
            locks,
            chunk_size: chunk_size.max(1),
            timeout,
            poll_interval,
        }
    }

    /// Poll until cancelled; the first check runs immediately
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Start monitoring (poll interval {:?}, inactivity timeout {:?})",
            self.poll_interval, self.timeout
        );
        let mut timer = interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let report = self.check_streams().await;
            if !report.finalized.is_empty() || report.failed > 0 {
                info!(
                    "Monitor cycle: {} checked, {} finalized, {} failed, {} busy",
                    report.checked,
                    report.finalized.len(),
                    report.failed,
                    report.busy
                );
            }
        }
        info!("Monitor stopped");
    }

    pub async fn check_streams(&self) -> MonitorReport {
        self.check_streams_at(epoch_secs()).await
    }

    /// One poll cycle with an explicit clock
    pub async fn check_streams_at(&self, now: f64) -> MonitorReport {
        let mut report = MonitorReport::default();

        let paths = match self.checkpoints.list_tracked_paths().await {
            Ok(paths) => paths,
            Err(e) => {
                error!(error = %e, "Monitor could not list tracked streams");
                report.failed += 1;
                return report;
            }
        };

        for path in paths {
            report.checked += 1;

            let Some(_guard) = self.locks.try_lock(Path::new(&path)) else {
                debug!(path = %path, "Skipping stream: upload in progress");
                report.busy += 1;
                continue;
            };

            let status = match self.evaluate(&path, now).await {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    error!(path = %path, error = %e, "Failed to check stream");
                    report.failed += 1;
                    continue;
                }
            };

            if status.state != StreamState::Complete {
                debug!(
                    path = %path,
                    state = ?status.state,
                    offset = status.record.offset,
                    file_size = ?status.file_size,
                    idle_secs = status.idle_secs,
                    "Not finalizing"
                );
                continue;
            }

            info!(path = %path, "Finalizing stream");
            match self.finalize_locked(&path).await {
                Ok(_) => report.finalized.push(path),
                Err(e) => {
                    error!(path = %path, error = %e, "Finalization failed");
                    report.failed += 1;
                }
            }
        }

        self.locks.prune();
        report
    }

    /// Evaluate one tracked path; `None` if it has no record
    pub async fn evaluate(&self, path: &str, now: f64) -> Result<Option<StreamStatus>, CheckpointError> {
        let Some(record) = self.checkpoints.get_record(path).await? else {
            return Ok(None);
        };

        let file_size = match tokio::fs::metadata(path).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: path.to_string(),
                    source,
                })
            }
        };

        let idle_secs = record.idle_secs(now);
        let state = match file_size {
            None => StreamState::Missing,
            Some(_) if is_stream_complete(file_size, record.offset, record.last_activity, now, self.timeout) => {
                StreamState::Complete
            }
            Some(size) if record.offset < size => StreamState::Uploading,
            Some(_) => StreamState::Idle,
        };

        debug!(
            path = %path,
            offset = record.offset,
            file_size = ?file_size,
            idle_secs,
            "Stream check"
        );

        Ok(Some(StreamStatus {
            record,
            file_size,
            idle_secs,
            state,
        }))
    }

    /// Finalize now, ignoring the inactivity timeout
    ///
    /// Waits for any upload of the path to finish. Returns `None` when bytes
    /// on disk are not all uploaded yet.
    pub async fn finalize(&self, path: &str) -> Result<Option<Finalized>, FinalizeError> {
        let _guard = self.locks.lock(Path::new(path)).await;

        let offset = self.checkpoints.get_offset(path).await?;
        let size = file_size(path).await?;
        if offset < size {
            warn!(path = %path, offset, file_size = size, "Not finalizing: bytes not uploaded yet");
            return Ok(None);
        }
        self.finalize_locked(path).await.map(Some)
    }

    async fn finalize_locked(&self, path: &str) -> Result<Finalized, FinalizeError> {
        let stream_id = self
            .checkpoints
            .get_stream_id(path)
            .await?
            .ok_or_else(|| FinalizeError::MissingStreamId {
                path: path.to_string(),
            })?;

        let size = file_size(path).await?;
        // Chunks past the end are left over from an earlier, longer file
        let chunk_count = size.div_ceil(self.chunk_size);
        let keys = self
            .objects
            .list_objects(&stream_id.chunk_prefix())
            .await?
            .into_iter()
            .filter(|key| parse_chunk_index(key).is_some_and(|index| index < chunk_count));
        let manifest = Manifest::new(stream_id.clone(), keys, epoch_secs(), size);

        self.objects
            .put_object(PutObject::json(stream_id.manifest_key(), manifest.to_json()?))
            .await?;
        info!(
            path = %path,
            stream_id = %stream_id,
            chunks = manifest.chunks.len(),
            file_size = size,
            "Manifest uploaded"
        );

        let record_cleared = self.checkpoints.clear_if_complete(path).await?;
        if !record_cleared {
            warn!(path = %path, "File grew during finalization, keeping its checkpoint");
        }

        Ok(Finalized {
            manifest,
            record_cleared,
        })
    }
}

async fn file_size(path: &str) -> Result<u64, FinalizeError> {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .map_err(|source| FinalizeError::Io {
            path: path.into(),
            source,
        })
}
