//! Object store access for streamdrop
//!
//! This crate provides:
//! - The `ObjectStore` trait used by the uploader and the completion monitor
//! - An S3-compatible implementation (MinIO, AWS) with explicit reconnect
//! - An in-memory implementation with digest checks and fault injection

pub mod error;
pub mod memory;
pub mod object;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

// Re-exports
pub use error::ObjectStoreError;
pub use memory::MemoryObjectStore;
pub use object::{sha256_base64, PutObject};
pub use s3::{S3Config, S3ObjectStore};

/// Result type for object store operations
pub type Result<T> = std::result::Result<T, ObjectStoreError>;

/// Bucket-scoped object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write one object; returns once the store has acknowledged it
    async fn put_object(&self, object: PutObject) -> Result<()>;

    /// Keys under a prefix, all pages, in no particular order
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Human readable target
    fn describe(&self) -> String;
}
