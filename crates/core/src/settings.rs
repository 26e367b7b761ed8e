//! Service settings
//!
//! Field names double as the environment variable names (upper-cased) and as
//! the keys of the optional TOML settings file, e.g. `CHUNK_SIZE` / `chunk_size`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default chunk size: 10 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Effective configuration of the ingest service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory watched for growing files
    pub watch_dir: PathBuf,
    /// Only files whose name ends with this suffix are ingested
    pub file_suffix: String,

    /// Object store bucket
    pub s3_bucket: String,
    /// Object store endpoint (S3-compatible)
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_region: String,

    /// Checkpoint store URL (`redis://`, `sled:<path>`, `memory:`)
    pub redis_url: String,

    /// Bytes per chunk object
    pub chunk_size: u64,
    /// Seconds without upload activity before a size-matched stream is complete
    pub stream_timeout: u64,
    /// Seconds between completion monitor polls
    pub poll_interval: u64,
    /// Seconds between reconciliation scans of the watch directory (0 disables)
    pub reconcile_interval: u64,

    /// Attempts per file upload against object store failures
    pub upload_attempts: u32,
    /// Seconds between file upload attempts
    pub upload_retry_delay: u64,

    /// Purge a file's checkpoint record as soon as its delete notification arrives
    pub purge_on_delete: bool,

    /// Local state directory (daemon lock, logs)
    pub state_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("/input"),
            file_suffix: ".mp4".to_string(),
            s3_bucket: "videos".to_string(),
            s3_endpoint: "http://minio:9000".to_string(),
            s3_access_key: "minioadmin".to_string(),
            s3_secret_key: "minioadmin".to_string(),
            s3_region: "us-east-1".to_string(),
            redis_url: "redis://redis:6379/0".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            stream_timeout: 30,
            poll_interval: 30,
            reconcile_interval: 300,
            upload_attempts: 5,
            upload_retry_delay: 5,
            purge_on_delete: false,
            state_dir: PathBuf::from(".streamdrop"),
        }
    }
}

impl Settings {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }
        if usize::try_from(self.chunk_size).is_err() {
            anyhow::bail!("chunk_size {} does not fit in memory on this platform", self.chunk_size);
        }
        if self.stream_timeout == 0 {
            anyhow::bail!("stream_timeout must be greater than 0");
        }
        if self.poll_interval == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }
        // A slower poll can miss the window between timeout and record expiry
        if self.poll_interval > self.stream_timeout {
            anyhow::bail!(
                "poll_interval ({}s) must not exceed stream_timeout ({}s)",
                self.poll_interval,
                self.stream_timeout
            );
        }
        if self.upload_attempts == 0 {
            anyhow::bail!("upload_attempts must be at least 1");
        }
        if self.file_suffix.is_empty() {
            anyhow::bail!("file_suffix must not be empty");
        }
        if self.s3_bucket.is_empty() {
            anyhow::bail!("s3_bucket must not be empty");
        }
        Ok(())
    }

    /// Idle time after which a size-matched stream is complete
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout)
    }

    /// Sliding expiry of checkpoint records (twice the inactivity timeout)
    pub fn record_ttl(&self) -> Duration {
        self.inactivity_timeout() * 2
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn upload_retry_delay(&self) -> Duration {
        Duration::from_secs(self.upload_retry_delay)
    }

    /// `None` when periodic reconciliation is disabled
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval > 0).then(|| Duration::from_secs(self.reconcile_interval))
    }

    /// Render as TOML with credentials masked
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.s3_secret_key = "********".to_string();
        Ok(toml::to_string_pretty(&shown)?)
    }
}
