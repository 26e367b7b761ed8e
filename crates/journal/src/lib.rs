//! Checkpoint store for streamdrop
//!
//! This crate provides:
//! - Per-path checkpoint records (stream id, confirmed offset, last activity)
//! - A retrying, reconnecting `CheckpointStore`
//! - Pluggable backends: Redis, embedded sled, in-memory

pub mod backend;
pub mod error;
pub mod record;
pub mod store;

// Re-exports
pub use backend::{BackendError, Connector, MemoryBackend, RecordConnection};
pub use error::CheckpointError;
pub use record::{RecordField, StreamRecord};
pub use store::{connector_for_url, CheckpointStore, RECONNECT_POLICY};

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;
