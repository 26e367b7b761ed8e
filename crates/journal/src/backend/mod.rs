//! Record store backends
//!
//! A backend is a [`Connector`] producing [`RecordConnection`] handles. The
//! connection speaks a small hash-per-key vocabulary (get/set field,
//! set-if-absent, expire, delete, scan) so the same retry logic in
//! [`CheckpointStore`](crate::CheckpointStore) drives Redis, sled and the
//! in-memory map.

mod memory;
mod redis_backend;
mod sled_backend;

pub use memory::MemoryBackend;
pub use redis_backend::RedisConnector;
pub use sled_backend::SledConnector;

use crate::record::RecordField;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error reported by a backend connection
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transient: the connection dropped, timed out or was refused
    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Command(String),
}

impl BackendError {
    pub fn is_connection(&self) -> bool {
        matches!(self, BackendError::Connection(_))
    }
}

pub type SharedConnection = Arc<dyn RecordConnection>;

/// Establishes connections to a record store
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<SharedConnection, BackendError>;

    /// Human readable target, credentials stripped
    fn describe(&self) -> String;
}

/// One live connection to a record store
#[async_trait]
pub trait RecordConnection: Send + Sync {
    async fn get_field(&self, key: &str, field: RecordField) -> Result<Option<String>, BackendError>;

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError>;

    async fn set_field(&self, key: &str, field: RecordField, value: &str) -> Result<(), BackendError>;

    /// Set a field only if it is absent; returns whether it was written
    async fn set_field_if_absent(
        &self,
        key: &str,
        field: RecordField,
        value: &str,
    ) -> Result<bool, BackendError>;

    /// (Re)start the expiry window of a key
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    async fn keys(&self) -> Result<Vec<String>, BackendError>;
}

/// Record representation for backends without native hashes or TTL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct LocalRecord {
    pub fields: BTreeMap<String, String>,
    /// Absolute expiry (epoch milliseconds)
    pub expires_at_ms: Option<i64>,
}

impl LocalRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    pub fn get(&self, field: RecordField) -> Option<String> {
        self.fields.get(field.as_str()).cloned()
    }

    pub fn set(&mut self, field: RecordField, value: &str) {
        self.fields.insert(field.as_str().to_string(), value.to_string());
    }

    pub fn expire(&mut self, ttl: Duration, now_ms: i64) {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.expires_at_ms = Some(now_ms.saturating_add(ttl_ms));
    }
}
