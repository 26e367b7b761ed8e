//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use engine::{ChunkUploader, CompletionMonitor, PathLocks};
use journal::{connector_for_url, CheckpointStore};
use objstore::{ObjectStore, S3Config, S3ObjectStore};
use sd_core::{RetryPolicy, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Service components for one-shot operator commands
///
/// Unlike the daemon, these fail fast: one attempt per checkpoint command
/// and a single upload attempt.
pub struct Components {
    pub checkpoints: Arc<CheckpointStore>,
    pub uploader: ChunkUploader,
    pub monitor: CompletionMonitor,
}

impl Components {
    pub fn new(settings: &Settings) -> Result<Self> {
        let connector = connector_for_url(&settings.redis_url)
            .context("Invalid checkpoint store URL")?;
        let checkpoints = Arc::new(
            CheckpointStore::new(connector, settings.record_ttl())
                .with_retry(RetryPolicy::immediate(1), RetryPolicy::immediate(1)),
        );
        let objects: Arc<dyn ObjectStore> =
            Arc::new(S3ObjectStore::new(S3Config::from_settings(settings)));
        let locks = Arc::new(PathLocks::new());

        let uploader = ChunkUploader::new(
            objects.clone(),
            checkpoints.clone(),
            locks.clone(),
            settings.chunk_size,
        )
        .with_retry(RetryPolicy::immediate(1));
        let monitor = CompletionMonitor::new(
            checkpoints.clone(),
            objects,
            locks,
            uploader.chunk_size(),
            settings.inactivity_timeout(),
            settings.poll_interval(),
        );

        Ok(Self {
            checkpoints,
            uploader,
            monitor,
        })
    }
}

/// Absolute, symlink-free form of a file argument
///
/// Falls back to joining with the current directory when the file no longer
/// exists, so records of deleted files can still be addressed.
pub fn resolve_file(file: &Path) -> Result<PathBuf> {
    if let Ok(path) = file.canonicalize() {
        return Ok(path);
    }
    if file.is_absolute() {
        return Ok(file.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(cwd.join(file))
}

/// Warn when a running daemon may touch the same records
pub fn warn_if_daemon_running(settings: &Settings) {
    if let Some(pid) = crate::locks::DaemonLock::holder(&settings.state_dir) {
        tracing::warn!("Daemon is running (pid {}); it may update the same records", pid);
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format an idle duration ("42s", "3m 05s", "2h 10m")
pub fn format_idle(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Format epoch seconds as local time ("2024-01-03 14:30:00")
pub fn format_timestamp(epoch_secs: f64) -> String {
    if epoch_secs <= 0.0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp(epoch_secs as i64, 0)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "invalid".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_size(1536), "1.50 KB");
    }

    #[test]
    fn test_format_idle() {
        assert_eq!(format_idle(-3.0), "0s");
        assert_eq!(format_idle(42.7), "42s");
        assert_eq!(format_idle(185.0), "3m 05s");
        assert_eq!(format_idle(7800.0), "2h 10m");
    }

    #[test]
    fn test_format_timestamp_never() {
        assert_eq!(format_timestamp(0.0), "never");
        assert_eq!(format_timestamp(1_700_000_000.0).len(), 19);
    }

    #[test]
    fn test_resolve_missing_relative_file() {
        let resolved = resolve_file(Path::new("does-not-exist.mp4")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("does-not-exist.mp4"));
    }
}
