//! Upload and finalization errors

use journal::CheckpointError;
use objstore::ObjectStoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Reading the source file failed; never retried
    #[error("file I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl UploadError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error("failed to stat {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode manifest")]
    Serialize(#[from] serde_json::Error),

    #[error("no stream id recorded for {path}")]
    MissingStreamId { path: String },
}
