//! Object store errors

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ObjectStoreError {
    /// Dispatch failure, timeout, 5xx or throttling
    #[error("object store unreachable during {op} {key}: {message}")]
    Connection {
        op: &'static str,
        key: String,
        message: String,
    },

    /// The service refused the request (bad digest, access denied, missing bucket)
    #[error("object store rejected {op} {key}: {message}")]
    Rejected {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("object store misconfigured: {0}")]
    Config(String),
}

impl ObjectStoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, ObjectStoreError::Connection { .. })
    }

    /// Whether another whole-file upload attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::Connection { .. } | ObjectStoreError::Rejected { .. }
        )
    }
}
