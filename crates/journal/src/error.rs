//! Checkpoint store errors

use crate::backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Connectivity failures outlasted the retry budget
    #[error("checkpoint store unreachable during {op} after {attempts} attempt(s)")]
    Connection {
        op: &'static str,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// Backend rejected the command; never retried
    #[error("checkpoint store failed during {op}")]
    Backend {
        op: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("corrupt {field} in checkpoint record for {path}: {value:?}")]
    Corrupt {
        path: String,
        field: &'static str,
        value: String,
    },

    #[error("failed to stat {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported checkpoint store url: {0}")]
    InvalidUrl(String),
}

impl CheckpointError {
    /// Whether the store could not be reached at all
    pub fn is_connection(&self) -> bool {
        matches!(self, CheckpointError::Connection { .. })
    }
}
