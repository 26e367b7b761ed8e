//! Shared primitives for streamdrop
//!
//! This crate provides:
//! - Deterministic stream identifiers (SHA-256 of the file path)
//! - The object key scheme for chunks and manifests
//! - The finalization manifest
//! - Service settings with defaults and validation
//! - Retry policies shared by the checkpoint and object store clients

pub mod manifest;
pub mod retry;
pub mod settings;
pub mod stream;
pub mod time;

// Re-exports
pub use manifest::Manifest;
pub use retry::RetryPolicy;
pub use settings::Settings;
pub use stream::{parse_chunk_index, StreamId};
pub use time::epoch_secs;

/// Common result type used throughout streamdrop-core
pub type Result<T> = anyhow::Result<T>;
