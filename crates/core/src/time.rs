//! Wall-clock helpers

use chrono::Utc;

/// Current time as fractional seconds since the Unix epoch
pub fn epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Current time as milliseconds since the Unix epoch
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}
