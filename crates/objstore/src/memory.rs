//! In-process object store with fault injection

use crate::error::ObjectStoreError;
use crate::object::{sha256_base64, PutObject};
use crate::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Map-backed store that verifies chunk digests like a real endpoint
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    put_log: Mutex<Vec<String>>,
    offline: AtomicBool,
    fail_puts: AtomicU32,
    reject_suffix: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Fail the next `n` puts with a connectivity error
    pub fn fail_next_puts(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Reject every put whose key ends with `suffix` (`None` clears)
    pub fn reject_puts_ending_with(&self, suffix: Option<&str>) {
        *self.reject_suffix.lock() = suffix.map(str::to_string);
    }

    /// Stored object, if any
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).cloned()
    }

    /// All stored keys in lexical order
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Keys of acknowledged puts, in order
    pub fn put_log(&self) -> Vec<String> {
        self.put_log.lock().clone()
    }

    pub fn put_count(&self) -> usize {
        self.put_log.lock().len()
    }

    fn check_link(&self, op: &'static str, key: &str) -> Result<(), ObjectStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Connection {
                op,
                key: key.to_string(),
                message: "endpoint offline".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, object: PutObject) -> Result<(), ObjectStoreError> {
        self.check_link("put_object", &object.key)?;

        let injected = self
            .fail_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ObjectStoreError::Connection {
                op: "put_object",
                key: object.key,
                message: "injected connection reset".into(),
            });
        }

        let rejected = self
            .reject_suffix
            .lock()
            .as_deref()
            .is_some_and(|suffix| object.key.ends_with(suffix));
        if rejected {
            return Err(ObjectStoreError::Rejected {
                op: "put_object",
                key: object.key,
                message: "AccessDenied".into(),
            });
        }

        if let Some(expected) = &object.checksum_sha256 {
            if *expected != sha256_base64(&object.body) {
                return Err(ObjectStoreError::Rejected {
                    op: "put_object",
                    key: object.key,
                    message: "BadDigest".into(),
                });
            }
        }

        self.put_log.lock().push(object.key.clone());
        self.objects.lock().insert(object.key, object.body);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        self.check_link("list_objects", prefix)?;
        Ok(self
            .objects
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.check_link("get_object", key)?;
        self.object(key).ok_or_else(|| ObjectStoreError::NotFound {
            key: key.to_string(),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_list_get() {
        let store = MemoryObjectStore::new();
        store
            .put_object(PutObject::chunk("a/chunk_000000.bin", Bytes::from_static(b"ABCD")))
            .await
            .unwrap();
        store
            .put_object(PutObject::json("a/metadata.json", b"{}".to_vec()))
            .await
            .unwrap();
        store
            .put_object(PutObject::chunk("b/chunk_000000.bin", Bytes::from_static(b"EF")))
            .await
            .unwrap();

        assert_eq!(store.list_objects("a/chunk_").await.unwrap(), vec!["a/chunk_000000.bin"]);
        assert_eq!(store.get_object("b/chunk_000000.bin").await.unwrap(), Bytes::from_static(b"EF"));
        assert!(matches!(
            store.get_object("c").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
        assert_eq!(store.put_count(), 3);
    }

    #[tokio::test]
    async fn test_bad_digest_is_rejected() {
        let store = MemoryObjectStore::new();
        let mut put = PutObject::chunk("a/chunk_000000.bin", Bytes::from_static(b"ABCD"));
        put.body = Bytes::from_static(b"ABCE");

        let err = store.put_object(put).await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::Rejected { .. }));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryObjectStore::new();
        store.fail_next_puts(1);
        let put = PutObject::json("a/x.json", b"1".to_vec());
        assert!(store.put_object(put.clone()).await.unwrap_err().is_connection());
        store.put_object(put.clone()).await.unwrap();

        store.reject_puts_ending_with(Some(".json"));
        assert!(!store.put_object(put.clone()).await.unwrap_err().is_connection());
        store.reject_puts_ending_with(None);

        store.set_online(false);
        assert!(store.list_objects("").await.unwrap_err().is_connection());
    }
}
