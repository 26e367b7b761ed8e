//! Redis backend: one hash per tracked path

use super::{BackendError, Connector, RecordConnection, SharedConnection};
use crate::record::RecordField;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

impl From<RedisError> for BackendError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            BackendError::Connection(err.to_string())
        } else {
            BackendError::Command(err.to_string())
        }
    }
}

pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Parse a `redis://` URL; no connection is made yet
    pub fn new(url: &str) -> Result<Self, RedisError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self) -> Result<SharedConnection, BackendError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Arc::new(RedisConnection { conn }))
    }

    fn describe(&self) -> String {
        let info = self.client.get_connection_info();
        format!("redis {}/{}", info.addr, info.redis.db)
    }
}

struct RedisConnection {
    conn: MultiplexedConnection,
}

impl RedisConnection {
    // Multiplexed handles are cheap to clone and share one socket
    fn handle(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl RecordConnection for RedisConnection {
    async fn get_field(&self, key: &str, field: RecordField) -> Result<Option<String>, BackendError> {
        let value: Option<String> = self.handle().hget(key, field.as_str()).await?;
        Ok(value)
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        let fields: HashMap<String, String> = self.handle().hgetall(key).await?;
        Ok(fields)
    }

    async fn set_field(&self, key: &str, field: RecordField, value: &str) -> Result<(), BackendError> {
        let _: () = self.handle().hset(key, field.as_str(), value).await?;
        Ok(())
    }

    async fn set_field_if_absent(
        &self,
        key: &str,
        field: RecordField,
        value: &str,
    ) -> Result<bool, BackendError> {
        let written: bool = self.handle().hset_nx(key, field.as_str(), value).await?;
        Ok(written)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
        let secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        let _: () = self.handle().expire(key, secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let _: () = self.handle().del(key).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, BackendError> {
        let mut conn = self.handle();
        let mut iter: redis::AsyncIter<String> = conn.scan().await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}
