//! In-process backend with connectivity fault injection

use super::{BackendError, Connector, LocalRecord, RecordConnection, SharedConnection};
use crate::record::RecordField;
use async_trait::async_trait;
use parking_lot::Mutex;
use sd_core::time::epoch_millis;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Shared {
    records: Mutex<HashMap<String, LocalRecord>>,
    offline: AtomicBool,
    fail_next: AtomicU32,
    connects: AtomicU32,
}

impl Shared {
    fn check_link(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Connection("memory backend offline".into()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BackendError::Connection("injected connection reset".into()));
        }
        Ok(())
    }

    fn live(&self, key: &str) -> Option<LocalRecord> {
        let mut records = self.records.lock();
        match records.get(key) {
            Some(record) if record.is_expired(epoch_millis()) => {
                records.remove(key);
                None
            }
            Some(record) => Some(record.clone()),
            None => None,
        }
    }
}

/// Map-backed record store
///
/// Clones share the same records, so a test can keep a handle to inject
/// faults while the store owns another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the backend off the network (`false`) or bring it back (`true`)
    pub fn set_online(&self, online: bool) {
        self.shared.offline.store(!online, Ordering::SeqCst);
    }

    /// Fail the next `n` commands or connection attempts with a connectivity error
    pub fn fail_next(&self, n: u32) {
        self.shared.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        let now = epoch_millis();
        self.shared
            .records
            .lock()
            .values()
            .filter(|record| !record.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Connector for MemoryBackend {
    async fn connect(&self) -> Result<SharedConnection, BackendError> {
        self.shared.check_link()?;
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl RecordConnection for MemoryConnection {
    async fn get_field(&self, key: &str, field: RecordField) -> Result<Option<String>, BackendError> {
        self.shared.check_link()?;
        Ok(self.shared.live(key).and_then(|record| record.get(field)))
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        self.shared.check_link()?;
        Ok(self
            .shared
            .live(key)
            .map(|record| record.fields.into_iter().collect())
            .unwrap_or_default())
    }

    async fn set_field(&self, key: &str, field: RecordField, value: &str) -> Result<(), BackendError> {
        self.shared.check_link()?;
        self.shared.live(key);
        self.shared
            .records
            .lock()
            .entry(key.to_string())
            .or_default()
            .set(field, value);
        Ok(())
    }

    async fn set_field_if_absent(
        &self,
        key: &str,
        field: RecordField,
        value: &str,
    ) -> Result<bool, BackendError> {
        self.shared.check_link()?;
        self.shared.live(key);
        let mut records = self.shared.records.lock();
        let record = records.entry(key.to_string()).or_default();
        if record.get(field).is_some() {
            return Ok(false);
        }
        record.set(field, value);
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
        self.shared.check_link()?;
        self.shared.live(key);
        if let Some(record) = self.shared.records.lock().get_mut(key) {
            record.expire(ttl, epoch_millis());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.shared.check_link()?;
        self.shared.records.lock().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, BackendError> {
        self.shared.check_link()?;
        let now = epoch_millis();
        let mut records = self.shared.records.lock();
        records.retain(|_, record| !record.is_expired(now));
        Ok(records.keys().cloned().collect())
    }
}
