//! Chunked, resumable file upload
//!
//! Chunk `k` of a stream always holds bytes `[k * chunk_size, (k + 1) * chunk_size)`
//! of the file. The checkpoint offset only moves after the object store has
//! acknowledged the chunk that ends there, so a crash at any point resumes
//! with at most one chunk uploaded twice.

use crate::error::UploadError;
use crate::locks::PathLocks;
use crate::path_key;
use bytes::Bytes;
use journal::CheckpointStore;
use objstore::{ObjectStore, PutObject};
use sd_core::{RetryPolicy, StreamId};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, info, warn};

/// Whole-file attempts against object store failures: 5, 5 seconds apart
pub const UPLOAD_POLICY: RetryPolicy = RetryPolicy::fixed(5, Duration::from_secs(5));

/// Result of one `upload_file` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub stream_id: StreamId,
    /// Chunks written by this call, across retries
    pub chunks: u64,
    pub bytes: u64,
    /// Confirmed offset when the call returned
    pub offset: u64,
}

pub struct ChunkUploader {
    objects: Arc<dyn ObjectStore>,
    checkpoints: Arc<CheckpointStore>,
    locks: Arc<PathLocks>,
    chunk_size: u64,
    retry: RetryPolicy,
}

impl ChunkUploader {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        checkpoints: Arc<CheckpointStore>,
        locks: Arc<PathLocks>,
        chunk_size: u64,
    ) -> Self {
        Self {
            objects,
            checkpoints,
            locks,
            chunk_size: chunk_size.max(1),
            retry: UPLOAD_POLICY,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn locks(&self) -> &Arc<PathLocks> {
        &self.locks
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Upload everything past the checkpoint, holding the path's guard
    pub async fn upload_file(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        let _guard = self.locks.lock(path).await;
        self.upload_locked(path).await
    }

    /// Same as [`upload_file`](Self::upload_file) for a caller already holding the guard
    pub async fn upload_locked(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        let key = path_key(path);
        let mut progress = Progress::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.upload_once(path, &key, &mut progress).await {
                Ok(outcome) => {
                    info!(
                        path = %path.display(),
                        stream_id = %outcome.stream_id,
                        chunks = outcome.chunks,
                        offset = outcome.offset,
                        "Completed upload"
                    );
                    return Ok(outcome);
                }
                Err(UploadError::ObjectStore(e)) if e.is_retryable() => {
                    error!(
                        path = %path.display(),
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        error = %e,
                        "Object store error during upload"
                    );
                    if !self.retry.has_next(attempt) {
                        error!(
                            critical = true,
                            path = %path.display(),
                            attempt,
                            "Upload failed after all attempts"
                        );
                        return Err(e.into());
                    }
                    let delay = self.retry.delay;
                    info!(path = %path.display(), attempt, ?delay, "Retrying upload");
                    tokio::time::sleep(delay).await;
                }
                Err(e @ UploadError::Io { .. }) => {
                    error!(path = %path.display(), error = ?e, "File I/O error during upload");
                    return Err(e);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Upload aborted");
                    return Err(e);
                }
            }
        }
    }

    async fn upload_once(
        &self,
        path: &Path,
        key: &str,
        progress: &mut Progress,
    ) -> Result<UploadOutcome, UploadError> {
        // Open first: a missing file must not create a record
        let mut file = File::open(path).await.map_err(UploadError::io(path))?;

        let size = file.metadata().await.map_err(UploadError::io(path))?.len();

        let mut stream_id = self.checkpoints.get_or_create_stream_id(key).await?;
        let mut offset = self.checkpoints.get_offset(key).await?;

        // Shorter than what was confirmed: the file was replaced, start over
        if size < offset {
            warn!(
                path = %path.display(),
                stream_id = %stream_id,
                offset,
                file_size = size,
                "File shrank below its checkpoint, restarting stream"
            );
            self.checkpoints.remove(key).await?;
            stream_id = self.checkpoints.get_or_create_stream_id(key).await?;
            offset = 0;
        }
        debug!(path = %path.display(), stream_id = %stream_id, offset, "Starting upload");

        let cs = self.chunk_size;
        loop {
            let chunk_start = offset - offset % cs;
            file.seek(SeekFrom::Start(chunk_start))
                .await
                .map_err(UploadError::io(path))?;
            let chunk = read_chunk(&mut file, cs).await.map_err(UploadError::io(path))?;
            let chunk_end = chunk_start + chunk.len() as u64;

            // Nothing past the confirmed offset
            if chunk_end <= offset {
                break;
            }

            let index = chunk_start / cs;
            let len = chunk.len() as u64;
            self.objects
                .put_object(PutObject::chunk(stream_id.chunk_key(index), chunk))
                .await?;

            self.checkpoints.set_offset(key, chunk_end).await?;
            self.checkpoints.touch_activity(key).await?;
            offset = chunk_end;
            progress.chunks += 1;
            progress.bytes += len;
            debug!(
                path = %path.display(),
                stream_id = %stream_id,
                chunk = index,
                bytes = len,
                offset,
                "Uploaded chunk"
            );

            if len < cs {
                break;
            }
        }

        Ok(UploadOutcome {
            stream_id,
            chunks: progress.chunks,
            bytes: progress.bytes,
            offset,
        })
    }
}

#[derive(Default)]
struct Progress {
    chunks: u64,
    bytes: u64,
}

/// Read up to `len` bytes, short only at end of file
async fn read_chunk(file: &mut File, len: u64) -> std::io::Result<Bytes> {
    let mut buf = Vec::new();
    file.take(len).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal::MemoryBackend;
    use objstore::MemoryObjectStore;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        path: std::path::PathBuf,
        objects: Arc<MemoryObjectStore>,
        checkpoints: Arc<CheckpointStore>,
        uploader: ChunkUploader,
    }

    fn fixture(content: &[u8], chunk_size: u64) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cam.mp4");
        std::fs::write(&path, content).unwrap();

        let objects = Arc::new(MemoryObjectStore::new());
        let checkpoints = Arc::new(
            CheckpointStore::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60))
                .with_retry(RetryPolicy::immediate(3), RetryPolicy::immediate(5)),
        );
        let uploader = ChunkUploader::new(
            objects.clone(),
            checkpoints.clone(),
            Arc::new(PathLocks::new()),
            chunk_size,
        )
        .with_retry(RetryPolicy::immediate(5));

        Fixture {
            _dir: dir,
            path,
            objects,
            checkpoints,
            uploader,
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_of_chunk_size() {
        let fx = fixture(b"ABCDEFGH", 4);
        let outcome = fx.uploader.upload_file(&fx.path).await.unwrap();
        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.offset, 8);

        // Caught up: the next call reads nothing new
        let again = fx.uploader.upload_file(&fx.path).await.unwrap();
        assert_eq!(again.chunks, 0);
        assert_eq!(fx.objects.put_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_file_creates_record_only() {
        let fx = fixture(b"", 4);
        let outcome = fx.uploader.upload_file(&fx.path).await.unwrap();
        assert_eq!(outcome.chunks, 0);
        assert_eq!(outcome.offset, 0);
        assert_eq!(fx.objects.put_count(), 0);

        let key = path_key(&fx.path);
        assert!(fx.checkpoints.get_stream_id(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error_without_record() {
        let fx = fixture(b"ABCD", 4);
        let missing = fx.path.with_file_name("gone.mp4");

        let err = fx.uploader.upload_file(&missing).await.unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
        assert!(fx.checkpoints.list_tracked_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_put_failures_are_retried() {
        let fx = fixture(b"ABCDEFGHIJ", 4);
        fx.objects.fail_next_puts(2);

        let outcome = fx.uploader.upload_file(&fx.path).await.unwrap();
        assert_eq!(outcome.offset, 10);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(fx.objects.put_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_last_good_offset() {
        let fx = fixture(b"ABCDEFGHIJ", 4);
        fx.objects.reject_puts_ending_with(Some("chunk_000001.bin"));

        let err = fx.uploader.upload_file(&fx.path).await.unwrap_err();
        assert!(matches!(err, UploadError::ObjectStore(_)));

        let key = path_key(&fx.path);
        assert_eq!(fx.checkpoints.get_offset(&key).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_chunk_bodies_match_byte_ranges() {
        let fx = fixture(b"ABCDEFGHIJ", 4);
        let outcome = fx.uploader.upload_file(&fx.path).await.unwrap();

        let id = outcome.stream_id;
        assert_eq!(fx.objects.object(&id.chunk_key(0)).unwrap(), Bytes::from_static(b"ABCD"));
        assert_eq!(fx.objects.object(&id.chunk_key(1)).unwrap(), Bytes::from_static(b"EFGH"));
        assert_eq!(fx.objects.object(&id.chunk_key(2)).unwrap(), Bytes::from_static(b"IJ"));
    }

    #[tokio::test]
    async fn test_shrunk_file_restarts_from_zero() {
        let fx = fixture(b"ABCDEFGHIJKL", 4);
        let first = fx.uploader.upload_file(&fx.path).await.unwrap();
        assert_eq!(first.offset, 12);

        std::fs::write(&fx.path, b"WXYZ").unwrap();
        let outcome = fx.uploader.upload_file(&fx.path).await.unwrap();
        assert_eq!(outcome.offset, 4);
        assert_eq!(outcome.chunks, 1);
        assert_eq!(outcome.stream_id, first.stream_id);

        let key = path_key(&fx.path);
        assert_eq!(fx.checkpoints.get_offset(&key).await.unwrap(), 4);
        assert_eq!(
            fx.objects.object(&outcome.stream_id.chunk_key(0)).unwrap(),
            Bytes::from_static(b"WXYZ")
        );
    }
}
