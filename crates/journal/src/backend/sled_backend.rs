//! Embedded sled backend for single-host deployments

use super::{BackendError, Connector, LocalRecord, RecordConnection, SharedConnection};
use crate::record::RecordField;
use async_trait::async_trait;
use parking_lot::Mutex;
use sd_core::time::epoch_millis;
use sled::Db;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

impl From<sled::Error> for BackendError {
    fn from(err: sled::Error) -> Self {
        BackendError::Command(err.to_string())
    }
}

impl From<bincode::Error> for BackendError {
    fn from(err: bincode::Error) -> Self {
        BackendError::Command(format!("record encoding: {}", err))
    }
}

/// Opens (once) a sled database directory
pub struct SledConnector {
    path: PathBuf,
    db: Mutex<Option<Db>>,
}

impl SledConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Connector for SledConnector {
    async fn connect(&self) -> Result<SharedConnection, BackendError> {
        let mut slot = self.db.lock();
        let db = match slot.as_ref() {
            Some(db) => db.clone(),
            None => {
                let db = sled::open(&self.path)?;
                *slot = Some(db.clone());
                db
            }
        };
        Ok(Arc::new(SledConnection { db }))
    }

    fn describe(&self) -> String {
        format!("sled {}", self.path.display())
    }
}

struct SledConnection {
    db: Db,
}

impl SledConnection {
    fn load(&self, key: &str) -> Result<Option<LocalRecord>, BackendError> {
        let Some(bytes) = self.db.get(key)? else {
            return Ok(None);
        };
        let record: LocalRecord = bincode::deserialize(&bytes)?;
        Ok((!record.is_expired(epoch_millis())).then_some(record))
    }

    /// Read-modify-write a record with compare-and-swap
    ///
    /// `apply` sees `None` for absent or expired records and returns the
    /// record to store (`None` deletes it) plus a value handed back to the
    /// caller.
    fn update<T, F>(&self, key: &str, mut apply: F) -> Result<T, BackendError>
    where
        F: FnMut(Option<LocalRecord>) -> (Option<LocalRecord>, T),
    {
        loop {
            let current = self.db.get(key)?;
            let decoded = match current.as_deref() {
                Some(bytes) => {
                    let record: LocalRecord = bincode::deserialize(bytes)?;
                    (!record.is_expired(epoch_millis())).then_some(record)
                }
                None => None,
            };

            let (next, output) = apply(decoded);
            let encoded = next.map(|record| bincode::serialize(&record)).transpose()?;

            if self.db.compare_and_swap(key, current, encoded)?.is_ok() {
                return Ok(output);
            }
        }
    }
}

#[async_trait]
impl RecordConnection for SledConnection {
    async fn get_field(&self, key: &str, field: RecordField) -> Result<Option<String>, BackendError> {
        Ok(self.load(key)?.and_then(|record| record.get(field)))
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        Ok(self
            .load(key)?
            .map(|record| record.fields.into_iter().collect())
            .unwrap_or_default())
    }

    async fn set_field(&self, key: &str, field: RecordField, value: &str) -> Result<(), BackendError> {
        self.update(key, |record| {
            let mut record = record.unwrap_or_default();
            record.set(field, value);
            (Some(record), ())
        })?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn set_field_if_absent(
        &self,
        key: &str,
        field: RecordField,
        value: &str,
    ) -> Result<bool, BackendError> {
        let written = self.update(key, |record| {
            let mut record = record.unwrap_or_default();
            if record.get(field).is_some() {
                return (Some(record), false);
            }
            record.set(field, value);
            (Some(record), true)
        })?;
        if written {
            self.db.flush_async().await?;
        }
        Ok(written)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
        self.update(key, |record| match record {
            Some(mut record) => {
                record.expire(ttl, epoch_millis());
                (Some(record), ())
            }
            None => (None, ()),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.db.remove(key)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, BackendError> {
        let now = epoch_millis();
        let mut keys = Vec::new();
        for item in self.db.iter() {
            let (key, value) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            let record: LocalRecord = match bincode::deserialize(&value) {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable checkpoint record");
                    continue;
                }
            };
            if record.is_expired(now) {
                continue;
            }
            keys.push(key);
        }
        Ok(keys)
    }
}
