//! Finalization manifest

use crate::stream::{parse_chunk_index, StreamId};
use serde::{Deserialize, Serialize};

/// Listing of a finished stream's chunk objects, written as `<stream_id>/metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub stream_id: StreamId,
    /// Chunk object keys in ascending chunk index order
    pub chunks: Vec<String>,
    /// Completion time (epoch seconds)
    pub completed_at: f64,
    /// Size of the source file at finalization (bytes)
    pub file_size: u64,
}

impl Manifest {
    /// Build a manifest from an unordered object listing
    ///
    /// Keys that are not chunk objects are dropped.
    pub fn new<I>(stream_id: StreamId, keys: I, completed_at: f64, file_size: u64) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut indexed: Vec<(u64, String)> = keys
            .into_iter()
            .filter_map(|key| parse_chunk_index(&key).map(|index| (index, key)))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        Self {
            stream_id,
            chunks: indexed.into_iter().map(|(_, key)| key).collect(),
            completed_at,
            file_size,
        }
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
