//! Stream identifiers and the object key scheme
//!
//! A stream id is the hex SHA-256 digest of the tracked file's path. It is a
//! pure function of the path, so a lost checkpoint record recreated for the
//! same path addresses the chunk objects already written under it.
//!
//! Object layout in the bucket:
//! ```text
//! <stream_id>/
//!   chunk_000000.bin
//!   chunk_000001.bin
//!   ...
//!   metadata.json
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Object name of the manifest written on finalization
pub const MANIFEST_OBJECT: &str = "metadata.json";

const CHUNK_PREFIX: &str = "chunk_";
const CHUNK_SUFFIX: &str = ".bin";

/// Identifier of one file's upload lifecycle (64 lowercase hex chars)
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Derive the stream id for a path key
    pub fn for_path(path: &str) -> Self {
        let digest = Sha256::digest(path.as_bytes());
        Self(hex::encode(digest))
    }

    /// Parse a stored stream id
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 64 {
            anyhow::bail!("Invalid stream id length: expected 64 characters, got {}", s.len());
        }
        hex::decode(s)?;
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the chunk with the given index
    pub fn chunk_key(&self, index: u64) -> String {
        format!("{}/{}{:06}{}", self.0, CHUNK_PREFIX, index, CHUNK_SUFFIX)
    }

    /// Listing prefix that matches every chunk of this stream
    pub fn chunk_prefix(&self) -> String {
        format!("{}/{}", self.0, CHUNK_PREFIX)
    }

    /// Key of the finalization manifest
    pub fn manifest_key(&self) -> String {
        format!("{}/{}", self.0, MANIFEST_OBJECT)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the chunk index from a chunk object key
///
/// Returns `None` for keys that are not chunk objects (e.g. the manifest).
pub fn parse_chunk_index(key: &str) -> Option<u64> {
    let name = key.rsplit('/').next()?;
    name.strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(CHUNK_SUFFIX)?
        .parse()
        .ok()
}
