//! Object write requests

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use sha2::{Digest, Sha256};

pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// One object to write
#[derive(Debug, Clone, PartialEq)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: &'static str,
    /// Base64 SHA-256 of `body`, verified by the store on receipt
    pub checksum_sha256: Option<String>,
}

impl PutObject {
    /// Chunk upload carrying an integrity digest
    pub fn chunk(key: impl Into<String>, body: Bytes) -> Self {
        let checksum = sha256_base64(&body);
        Self {
            key: key.into(),
            body,
            content_type: CONTENT_TYPE_BINARY,
            checksum_sha256: Some(checksum),
        }
    }

    pub fn json(key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
            content_type: CONTENT_TYPE_JSON,
            checksum_sha256: None,
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Base64-encoded SHA-256 digest, the `x-amz-checksum-sha256` format
pub fn sha256_base64(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}
