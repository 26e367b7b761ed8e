//! Ingest engine for streamdrop
//!
//! This crate provides:
//! - `ChunkUploader`: resumable chunked upload of a growing file
//! - `CompletionMonitor`: periodic completion checks and manifest finalization
//! - `IngestCoordinator`: file change reactions driving the uploader
//! - `PathLocks`: one upload or finalization per path at a time

pub mod coordinator;
pub mod error;
pub mod locks;
pub mod monitor;
pub mod uploader;

use std::path::Path;

// Re-exports
pub use coordinator::IngestCoordinator;
pub use error::{FinalizeError, UploadError};
pub use locks::PathLocks;
pub use monitor::{is_stream_complete, CompletionMonitor, Finalized, MonitorReport, StreamState, StreamStatus};
pub use uploader::{ChunkUploader, UploadOutcome, UPLOAD_POLICY};

/// Checkpoint record key for a file path
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
