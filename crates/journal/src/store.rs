//! Retrying, reconnecting checkpoint store
//!
//! Every operation runs through [`CheckpointStore::execute`]: a connectivity
//! failure invalidates the cached connection, the next attempt reconnects
//! (itself bounded), and the operation is retried up to the per-command
//! budget. Anything else surfaces immediately.

use crate::backend::{
    BackendError, Connector, MemoryBackend, RedisConnector, SharedConnection, SledConnector,
};
use crate::error::CheckpointError;
use crate::record::{RecordField, StreamRecord};
use parking_lot::Mutex;
use sd_core::{epoch_secs, RetryPolicy, StreamId};
use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Reconnect budget: 5 attempts, 5 seconds apart
pub const RECONNECT_POLICY: RetryPolicy = RetryPolicy::fixed(5, Duration::from_secs(5));

enum ConnectionState {
    Connected(SharedConnection),
    Disconnected,
}

/// Durable per-path upload progress
pub struct CheckpointStore {
    connector: Arc<dyn Connector>,
    state: Mutex<ConnectionState>,
    /// Serializes reconnect attempts
    reconnecting: tokio::sync::Mutex<()>,
    ttl: Duration,
    command_retry: RetryPolicy,
    reconnect_retry: RetryPolicy,
}

impl CheckpointStore {
    /// Store over an arbitrary connector; connects lazily on first use
    pub fn new(connector: Arc<dyn Connector>, ttl: Duration) -> Self {
        Self {
            connector,
            state: Mutex::new(ConnectionState::Disconnected),
            reconnecting: tokio::sync::Mutex::new(()),
            ttl,
            command_retry: RetryPolicy::default(),
            reconnect_retry: RECONNECT_POLICY,
        }
    }

    /// Store for a URL (`redis://`, `rediss://`, `sled:<path>`, `memory:`)
    ///
    /// An unreachable store is not fatal here: it is logged and every later
    /// operation tries to reconnect.
    pub async fn open(url: &str, ttl: Duration) -> Result<Self> {
        let store = Self::new(connector_for_url(url)?, ttl);
        if let Err(e) = store.reconnect().await {
            error!(critical = true, "Could not connect to checkpoint store: {}", e);
        }
        Ok(store)
    }

    /// Override the per-command and reconnect retry budgets
    pub fn with_retry(mut self, command: RetryPolicy, reconnect: RetryPolicy) -> Self {
        self.command_retry = command;
        self.reconnect_retry = reconnect;
        self
    }

    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.lock(), ConnectionState::Connected(_))
    }

    /// Drop the current connection and establish a new one
    pub async fn reconnect(&self) -> Result<()> {
        self.invalidate(None);
        self.connection().await.map(|_| ()).map_err(|source| {
            CheckpointError::Connection {
                op: "reconnect",
                attempts: self.reconnect_retry.max_attempts(),
                source,
            }
        })
    }

    /// Mark the store disconnected
    ///
    /// With `seen`, only that exact connection is dropped so a handle freshly
    /// established by a concurrent caller survives.
    fn invalidate(&self, seen: Option<&SharedConnection>) {
        let mut state = self.state.lock();
        let stale = match (&*state, seen) {
            (ConnectionState::Connected(current), Some(seen)) => Arc::ptr_eq(current, seen),
            (ConnectionState::Connected(_), None) => true,
            (ConnectionState::Disconnected, _) => false,
        };
        if stale {
            *state = ConnectionState::Disconnected;
        }
    }

    fn current(&self) -> Option<SharedConnection> {
        match &*self.state.lock() {
            ConnectionState::Connected(conn) => Some(Arc::clone(conn)),
            ConnectionState::Disconnected => None,
        }
    }

    /// Cached connection, or a new one within the reconnect budget
    async fn connection(&self) -> std::result::Result<SharedConnection, BackendError> {
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let _guard = self.reconnecting.lock().await;
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let policy = self.reconnect_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.connector.connect().await {
                Ok(conn) => {
                    info!("Checkpoint store connected ({})", self.connector.describe());
                    *self.state.lock() = ConnectionState::Connected(Arc::clone(&conn));
                    return Ok(conn);
                }
                Err(e) => {
                    error!(
                        "Failed to connect to checkpoint store (attempt {}/{}): {}",
                        attempt,
                        policy.max_attempts(),
                        e
                    );
                    if !e.is_connection() || !policy.has_next(attempt) {
                        return Err(e);
                    }
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    /// Run one command with reconnect-and-retry on connectivity errors
    async fn execute<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T>
    where
        F: Fn(SharedConnection) -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let policy = self.command_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.connection().await {
                Ok(conn) => command(Arc::clone(&conn)).await.map_err(|e| (Some(conn), e)),
                Err(e) => Err((None, e)),
            };

            let (conn, err) = match outcome {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if !err.is_connection() {
                error!("Checkpoint store command '{}' failed: {}", op, err);
                return Err(CheckpointError::Backend { op, source: err });
            }

            warn!(
                "Checkpoint store connection error during '{}' (attempt {}/{}): {}",
                op,
                attempt,
                policy.max_attempts(),
                err
            );
            self.invalidate(conn.as_ref());

            if !policy.has_next(attempt) {
                error!(
                    critical = true,
                    "Checkpoint store command '{}' failed after {} attempts", op, attempt
                );
                return Err(CheckpointError::Connection {
                    op,
                    attempts: attempt,
                    source: err,
                });
            }
            tokio::time::sleep(policy.delay).await;
        }
    }

    /// Stream id of `path`, creating the record (offset 0) if absent
    ///
    /// Idempotent: an existing id is never overwritten, and concurrent
    /// creators agree on the stored value.
    pub async fn get_or_create_stream_id(&self, path: &str) -> Result<StreamId> {
        let ttl = self.ttl;
        let raw = self
            .execute("get_or_create_stream_id", |conn| {
                let key = path.to_string();
                async move {
                    if let Some(existing) = conn.get_field(&key, RecordField::StreamId).await? {
                        return Ok(existing);
                    }

                    let id = StreamId::for_path(&key);
                    if conn
                        .set_field_if_absent(&key, RecordField::StreamId, id.as_str())
                        .await?
                    {
                        conn.set_field_if_absent(&key, RecordField::Offset, "0").await?;
                        conn.expire(&key, ttl).await?;
                        return Ok(id.as_str().to_string());
                    }

                    // Lost a creation race; the winner's value stands
                    let stored = conn.get_field(&key, RecordField::StreamId).await?;
                    Ok::<_, BackendError>(stored.unwrap_or_else(|| id.as_str().to_string()))
                }
            })
            .await?;

        parse_stream_id(path, &raw)
    }

    pub async fn get_stream_id(&self, path: &str) -> Result<Option<StreamId>> {
        let raw = self.get_field("get_stream_id", path, RecordField::StreamId).await?;
        raw.map(|raw| parse_stream_id(path, &raw)).transpose()
    }

    /// Confirmed offset (0 if untracked)
    pub async fn get_offset(&self, path: &str) -> Result<u64> {
        let raw = self.get_field("get_offset", path, RecordField::Offset).await?;
        raw.map(|raw| parse_offset(path, &raw))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Persist the offset and restart the record's expiry window
    pub async fn set_offset(&self, path: &str, offset: u64) -> Result<()> {
        let ttl = self.ttl;
        self.execute("set_offset", |conn| {
            let key = path.to_string();
            async move {
                conn.set_field(&key, RecordField::Offset, &offset.to_string()).await?;
                conn.expire(&key, ttl).await
            }
        })
        .await?;
        debug!(path = %path, offset, "Updated offset");
        Ok(())
    }

    /// Record upload activity now
    pub async fn touch_activity(&self, path: &str) -> Result<()> {
        self.set_last_activity(path, epoch_secs()).await
    }

    /// Record upload activity at an explicit epoch time
    pub async fn set_last_activity(&self, path: &str, at: f64) -> Result<()> {
        let ttl = self.ttl;
        self.execute("set_last_activity", |conn| {
            let key = path.to_string();
            async move {
                conn.set_field(&key, RecordField::LastModified, &at.to_string()).await?;
                conn.expire(&key, ttl).await
            }
        })
        .await
    }

    /// Epoch seconds of the last activity (0 if never)
    pub async fn get_last_activity(&self, path: &str) -> Result<f64> {
        let raw = self.get_field("get_last_activity", path, RecordField::LastModified).await?;
        match raw {
            Some(raw) => raw.parse().map_err(|_| CheckpointError::Corrupt {
                path: path.to_string(),
                field: RecordField::LastModified.as_str(),
                value: raw,
            }),
            None => Ok(0.0),
        }
    }

    /// Whole record in one round trip, `None` when untracked
    pub async fn get_record(&self, path: &str) -> Result<Option<StreamRecord>> {
        let fields = self
            .execute("get_record", |conn| {
                let key = path.to_string();
                async move { conn.get_all(&key).await }
            })
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let field = |f: RecordField| fields.get(f.as_str());
        let stream_id = field(RecordField::StreamId)
            .map(|raw| parse_stream_id(path, raw))
            .transpose()?;
        let offset = field(RecordField::Offset)
            .map(|raw| parse_offset(path, raw))
            .transpose()?
            .unwrap_or_default();
        let last_activity = match field(RecordField::LastModified) {
            Some(raw) => raw.parse().map_err(|_| CheckpointError::Corrupt {
                path: path.to_string(),
                field: RecordField::LastModified.as_str(),
                value: raw.clone(),
            })?,
            None => 0.0,
        };

        Ok(Some(StreamRecord {
            path: path.to_string(),
            stream_id,
            offset,
            last_activity,
        }))
    }

    /// Paths of every live record
    pub async fn list_tracked_paths(&self) -> Result<Vec<String>> {
        let mut paths = self
            .execute("list_tracked_paths", |conn| async move { conn.keys().await })
            .await?;
        paths.sort();
        Ok(paths)
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        self.execute("remove", |conn| {
            let key = path.to_string();
            async move { conn.delete(&key).await }
        })
        .await?;
        debug!(path = %path, "Removed checkpoint record");
        Ok(())
    }

    /// Delete the record if the file is fully uploaded or gone
    ///
    /// Returns whether the record was deleted. A file that is larger than
    /// the confirmed offset keeps its record.
    pub async fn clear_if_complete(&self, path: &str) -> Result<bool> {
        let offset = self.get_offset(path).await?;
        match tokio::fs::metadata(path).await {
            Ok(meta) if offset >= meta.len() => {
                self.remove(path).await?;
                Ok(true)
            }
            Ok(meta) => {
                debug!(
                    "Keeping checkpoint for {}: offset {} < size {}",
                    path,
                    offset,
                    meta.len()
                );
                Ok(false)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path, "Clearing checkpoint for non-existent file");
                self.remove(path).await?;
                Ok(true)
            }
            Err(source) => Err(CheckpointError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn get_field(
        &self,
        op: &'static str,
        path: &str,
        field: RecordField,
    ) -> Result<Option<String>> {
        self.execute(op, |conn| {
            let key = path.to_string();
            async move { conn.get_field(&key, field).await }
        })
        .await
    }
}

/// Pick the backend for a checkpoint store URL
pub fn connector_for_url(url: &str) -> Result<Arc<dyn Connector>> {
    if url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("redis+unix://") {
        let connector = RedisConnector::new(url)
            .map_err(|e| CheckpointError::InvalidUrl(format!("{}: {}", url, e)))?;
        return Ok(Arc::new(connector));
    }
    if let Some(path) = url.strip_prefix("sled:") {
        if path.is_empty() {
            return Err(CheckpointError::InvalidUrl(url.to_string()));
        }
        return Ok(Arc::new(SledConnector::new(path)));
    }
    if url == "memory:" {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    Err(CheckpointError::InvalidUrl(url.to_string()))
}

fn parse_stream_id(path: &str, raw: &str) -> Result<StreamId> {
    StreamId::from_hex(raw).map_err(|_| CheckpointError::Corrupt {
        path: path.to_string(),
        field: RecordField::StreamId.as_str(),
        value: raw.to_string(),
    })
}

fn parse_offset(path: &str, raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| CheckpointError::Corrupt {
        path: path.to_string(),
        field: RecordField::Offset.as_str(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn memory_store() -> (CheckpointStore, MemoryBackend) {
        let backend = MemoryBackend::new();
        let store = CheckpointStore::new(Arc::new(backend.clone()), TTL)
            .with_retry(RetryPolicy::immediate(3), RetryPolicy::immediate(5));
        (store, backend)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (store, _) = memory_store();
        let id = store.get_or_create_stream_id("/in/a.mp4").await.unwrap();
        assert_eq!(id, StreamId::for_path("/in/a.mp4"));

        store.set_offset("/in/a.mp4", 8).await.unwrap();
        let again = store.get_or_create_stream_id("/in/a.mp4").await.unwrap();
        assert_eq!(again, id);
        assert_eq!(store.get_offset("/in/a.mp4").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_absent_record_defaults() {
        let (store, _) = memory_store();
        assert_eq!(store.get_stream_id("/nope").await.unwrap(), None);
        assert_eq!(store.get_offset("/nope").await.unwrap(), 0);
        assert_eq!(store.get_last_activity("/nope").await.unwrap(), 0.0);
        assert_eq!(store.get_record("/nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_round_trip() {
        let (store, _) = memory_store();
        store.get_or_create_stream_id("/in/a.mp4").await.unwrap();
        store.set_offset("/in/a.mp4", 4).await.unwrap();
        store.set_last_activity("/in/a.mp4", 1234.5).await.unwrap();

        let record = store.get_record("/in/a.mp4").await.unwrap().unwrap();
        assert_eq!(record.stream_id, Some(StreamId::for_path("/in/a.mp4")));
        assert_eq!(record.offset, 4);
        assert_eq!(record.last_activity, 1234.5);
        assert_eq!(store.get_last_activity("/in/a.mp4").await.unwrap(), 1234.5);
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let (store, _) = memory_store();
        store.get_or_create_stream_id("/in/b.mp4").await.unwrap();
        store.get_or_create_stream_id("/in/a.mp4").await.unwrap();
        assert_eq!(
            store.list_tracked_paths().await.unwrap(),
            vec!["/in/a.mp4".to_string(), "/in/b.mp4".to_string()]
        );

        store.remove("/in/a.mp4").await.unwrap();
        assert_eq!(store.list_tracked_paths().await.unwrap(), vec!["/in/b.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_drop() {
        let (store, backend) = memory_store();
        store.get_or_create_stream_id("/in/a.mp4").await.unwrap();
        assert!(store.is_connected());
        assert_eq!(backend.connect_count(), 1);

        backend.fail_next(1);
        store.set_offset("/in/a.mp4", 4).await.unwrap();

        assert_eq!(store.get_offset("/in/a.mp4").await.unwrap(), 4);
        assert_eq!(backend.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_hard_failures() {
        let (store, backend) = memory_store();
        backend.set_online(false);

        let err = store.get_offset("/in/a.mp4").await.unwrap_err();
        assert!(err.is_connection());
        match err {
            CheckpointError::Connection { op, attempts, .. } => {
                assert_eq!(op, "get_offset");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.is_connected());

        backend.set_online(true);
        assert_eq!(store.get_offset("/in/a.mp4").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_offset_is_reported() {
        let (store, backend) = memory_store();
        let conn = backend.connect().await.unwrap();
        conn.set_field("/in/a.mp4", RecordField::Offset, "lots").await.unwrap();

        let err = store.get_offset("/in/a.mp4").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { field: "offset", .. }));
    }

    #[tokio::test]
    async fn test_offset_update_applies_ttl() {
        let backend = MemoryBackend::new();
        let store = CheckpointStore::new(Arc::new(backend.clone()), Duration::from_millis(20));
        store.set_offset("/in/a.mp4", 4).await.unwrap();
        assert_eq!(backend.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(backend.is_empty());
        assert!(store.list_tracked_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_if_complete() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"ABCDEFGHIJ").unwrap();
        let path = file.to_str().unwrap();

        let (store, _) = memory_store();
        store.get_or_create_stream_id(path).await.unwrap();
        store.set_offset(path, 8).await.unwrap();
        assert!(!store.clear_if_complete(path).await.unwrap());
        assert_eq!(store.get_offset(path).await.unwrap(), 8);

        store.set_offset(path, 10).await.unwrap();
        assert!(store.clear_if_complete(path).await.unwrap());
        assert_eq!(store.get_record(path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_if_complete_missing_file() {
        let (store, _) = memory_store();
        store.get_or_create_stream_id("/does/not/exist.mp4").await.unwrap();
        assert!(store.clear_if_complete("/does/not/exist.mp4").await.unwrap());
        assert!(store.list_tracked_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connector_for_url() {
        let dir = TempDir::new().unwrap();
        let sled_url = format!("sled:{}", dir.path().join("db").display());

        assert_eq!(connector_for_url("memory:").unwrap().describe(), "memory");
        assert!(connector_for_url(&sled_url).unwrap().describe().starts_with("sled "));
        assert!(connector_for_url("redis://localhost:6379/0").is_ok());
        assert!(matches!(
            connector_for_url("ftp://nope"),
            Err(CheckpointError::InvalidUrl(_))
        ));
        assert!(connector_for_url("sled:").is_err());
    }

    #[tokio::test]
    async fn test_sled_store_end_to_end() {
        let dir = TempDir::new().unwrap();
        let url = format!("sled:{}", dir.path().join("db").display());
        let store = CheckpointStore::open(&url, TTL).await.unwrap();
        assert!(store.is_connected());

        store.get_or_create_stream_id("/in/a.mp4").await.unwrap();
        store.set_offset("/in/a.mp4", 12).await.unwrap();
        assert_eq!(store.get_offset("/in/a.mp4").await.unwrap(), 12);
    }
}
