//! S3-compatible object store (MinIO, AWS)

use crate::error::ObjectStoreError;
use crate::object::PutObject;
use crate::ObjectStore;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use parking_lot::RwLock;
use sd_core::Settings;
use tracing::{debug, info, warn};

/// Connection parameters for an S3-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// SDK-level attempts per request
    pub max_attempts: u32,
}

impl S3Config {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            endpoint: settings.s3_endpoint.clone(),
            region: settings.s3_region.clone(),
            access_key: settings.s3_access_key.clone(),
            secret_key: settings.s3_secret_key.clone(),
            bucket: settings.s3_bucket.clone(),
            max_attempts: 3,
        }
    }
}

/// Object store client with an explicit connected/disconnected state
///
/// The SDK client is built lazily and dropped after a connectivity failure,
/// so the next call starts over with a fresh connection pool.
pub struct S3ObjectStore {
    config: S3Config,
    client: RwLock<Option<Client>>,
}

impl S3ObjectStore {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    /// Discard the current client and build a new one
    pub async fn reconnect(&self) -> Client {
        self.client.write().take();
        self.client().await
    }

    async fn client(&self) -> Client {
        if let Some(client) = self.client.read().clone() {
            return client;
        }

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&self.config.endpoint)
            .region(Region::new(self.config.region.clone()))
            .credentials_provider(Credentials::new(
                &self.config.access_key,
                &self.config.secret_key,
                None,
                None,
                "streamdrop",
            ))
            .retry_config(RetryConfig::standard().with_max_attempts(self.config.max_attempts))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);

        info!(
            "S3 client ready: {} (bucket: {})",
            self.config.endpoint, self.config.bucket
        );
        *self.client.write() = Some(client.clone());
        client
    }

    /// Map an SDK failure, dropping the client on connectivity errors
    fn fail<E>(&self, op: &'static str, key: &str, err: SdkError<E, HttpResponse>) -> ObjectStoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let classified = classify(op, key, err);
        if classified.is_connection() {
            warn!("S3 connection error, client will be rebuilt: {}", classified);
            self.client.write().take();
        }
        classified
    }
}

fn classify<E>(op: &'static str, key: &str, err: SdkError<E, HttpResponse>) -> ObjectStoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let key = key.to_string();

    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            ObjectStoreError::Connection { op, key, message }
        }
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let code = context.err().code();
            if status >= 500 || status == 429 || code == Some("SlowDown") {
                ObjectStoreError::Connection { op, key, message }
            } else if status == 404 && code != Some("NoSuchBucket") {
                ObjectStoreError::NotFound { key }
            } else {
                ObjectStoreError::Rejected { op, key, message }
            }
        }
        _ => ObjectStoreError::Config(message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, object: PutObject) -> Result<(), ObjectStoreError> {
        let client = self.client().await;
        let size = object.len();
        let mut request = client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&object.key)
            .content_type(object.content_type)
            .body(ByteStream::from(object.body));
        if let Some(checksum) = object.checksum_sha256 {
            request = request.checksum_sha256(checksum);
        }

        request
            .send()
            .await
            .map_err(|e| self.fail("put_object", &object.key, e))?;
        debug!("Stored {} ({} bytes)", object.key, size);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let client = self.client().await;
        let mut pages = client
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| self.fail("list_objects", prefix, e))?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let client = self.client().await;
        let output = client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.fail("get_object", key, e))?;

        let body = output.body.collect().await.map_err(|e| ObjectStoreError::Connection {
            op: "get_object",
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.into_bytes())
    }

    fn describe(&self) -> String {
        format!("s3 {}/{}", self.config.endpoint, self.config.bucket)
    }
}
