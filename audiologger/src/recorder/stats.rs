//! Per-stream recording statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of a single stream's most recent recording attempt.
///
/// Mutated only by the recorder; readable concurrently by the HTTP surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    pub start_time: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub detected_bitrate_kbps: Option<u32>,
}

impl StreamStats {
    pub fn started() -> Self {
        Self {
            start_time: Some(Utc::now()),
            attempts: 0,
            last_error: None,
            detected_bitrate_kbps: None,
        }
    }
}
