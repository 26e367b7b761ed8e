//! Checkpoint record layout

use sd_core::StreamId;

/// Field of a checkpoint record as stored in the backend hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    StreamId,
    Offset,
    /// Last upload activity (epoch seconds, float)
    LastModified,
}

impl RecordField {
    pub const ALL: [RecordField; 3] = [
        RecordField::StreamId,
        RecordField::Offset,
        RecordField::LastModified,
    ];

    /// Name of the field inside the record hash
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::StreamId => "stream_id",
            RecordField::Offset => "offset",
            RecordField::LastModified => "last_modified",
        }
    }
}

/// Decoded checkpoint record of one tracked path
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub path: String,
    pub stream_id: Option<StreamId>,
    /// Bytes confirmed uploaded
    pub offset: u64,
    /// Epoch seconds of the last chunk upload or touch (0 if never)
    pub last_activity: f64,
}

impl StreamRecord {
    /// Seconds since the last recorded activity
    pub fn idle_secs(&self, now: f64) -> f64 {
        (now - self.last_activity).max(0.0)
    }
}
