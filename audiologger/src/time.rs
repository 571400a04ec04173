//! Canonical timestamp handling and path construction (C1).
//!
//! A single canonical timezone governs every user-visible timestamp and
//! every filename. Two textual forms are used throughout the crate:
//!
//! - **Hour form** `YYYY-MM-DD-HH` — filenames and path-bound identifiers.
//! - **Display form** `YYYY-MM-DD HH:MM` — API payloads and cache-key input.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Timelike};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// An hour-aligned instant in the canonical timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hour(DateTime<Tz>);

impl Hour {
    /// Truncate an arbitrary instant down to its containing hour in `tz`.
    pub fn truncate(instant: DateTime<Tz>) -> Self {
        let truncated = instant
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(instant);
        Self(truncated)
    }

    pub fn inner(&self) -> DateTime<Tz> {
        self.0
    }

    /// Render in hour form: `YYYY-MM-DD-HH`.
    pub fn hour_form(&self) -> String {
        self.0.format("%Y-%m-%d-%H").to_string()
    }

    /// The next hour.
    pub fn succ(&self) -> Self {
        Self(self.0 + chrono::Duration::hours(1))
    }
}

/// Render an instant in display form: `YYYY-MM-DD HH:MM` (minute precision).
pub fn display_form(instant: DateTime<Tz>) -> String {
    instant.format("%Y-%m-%d %H:%M").to_string()
}

/// Parse an hour-form string (`YYYY-MM-DD-HH`) into an hour-aligned instant
/// in `tz`.
pub fn parse_hour(s: &str, tz: Tz) -> Result<Hour> {
    let naive = chrono::NaiveDateTime::parse_from_str(&format!("{s}:00:00"), "%Y-%m-%d-%H:%M:%S")
        .map_err(|_| Error::MalformedRequest(format!("invalid hour '{s}', expected YYYY-MM-DD-HH")))?;
    let dt = tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| Error::MalformedRequest(format!("ambiguous or invalid local time for '{s}'")))?;
    Ok(Hour::truncate(dt))
}

/// The current hour (truncated `now`) in the canonical timezone.
pub fn current_hour(tz: Tz) -> Hour {
    Hour::truncate(chrono::Utc::now().with_timezone(&tz))
}

/// Construct the path of a stream's directory: `<root>/<stream>`.
pub fn stream_dir(root: &Path, stream: &str) -> PathBuf {
    root.join(stream)
}

/// Construct the canonical path of a published recording:
/// `<root>/<stream>/<hour>.<ext>`.
pub fn recording_path(root: &Path, stream: &str, hour: &Hour, ext: &str) -> PathBuf {
    stream_dir(root, stream).join(format!("{}.{}", hour.hour_form(), ext))
}

/// Construct the path of an in-flight temporary capture:
/// `<root>/<stream>/<hour>.rec`.
pub fn temp_recording_path(root: &Path, stream: &str, hour: &Hour) -> PathBuf {
    stream_dir(root, stream).join(format!("{}.rec", hour.hour_form()))
}

/// Construct the path of a metadata sidecar: `<root>/<stream>/<hour>.meta`.
pub fn metadata_path(root: &Path, stream: &str, hour: &Hour) -> PathBuf {
    stream_dir(root, stream).join(format!("{}.meta", hour.hour_form()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;

    #[test]
    fn truncate_drops_minutes_and_seconds() {
        let dt = UTC.with_ymd_and_hms(2024, 1, 15, 14, 37, 52).unwrap();
        let hour = Hour::truncate(dt);
        assert_eq!(hour.hour_form(), "2024-01-15-14");
    }

    #[test]
    fn parse_hour_round_trips_with_truncate() {
        let dt = UTC.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let hour = Hour::truncate(dt);
        let parsed = parse_hour(&hour.hour_form(), UTC).unwrap();
        assert_eq!(parsed.hour_form(), hour.hour_form());
    }

    #[test]
    fn parse_hour_rejects_malformed() {
        assert!(parse_hour("not-a-date", UTC).is_err());
        assert!(parse_hour("2024-01-15", UTC).is_err());
    }

    #[test]
    fn display_form_has_minute_precision() {
        let dt = UTC.with_ymd_and_hms(2024, 1, 15, 14, 10, 33).unwrap();
        assert_eq!(display_form(dt), "2024-01-15 14:10");
    }

    #[test]
    fn paths_use_expected_layout() {
        let root = Path::new("/var/audio");
        let dt = UTC.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let hour = Hour::truncate(dt);
        assert_eq!(
            recording_path(root, "zw", &hour, "mp3"),
            PathBuf::from("/var/audio/zw/2024-01-15-14.mp3")
        );
        assert_eq!(
            temp_recording_path(root, "zw", &hour),
            PathBuf::from("/var/audio/zw/2024-01-15-14.rec")
        );
        assert_eq!(
            metadata_path(root, "zw", &hour),
            PathBuf::from("/var/audio/zw/2024-01-15-14.meta")
        );
    }

    #[test]
    fn succ_advances_one_hour() {
        let dt = UTC.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        let hour = Hour::truncate(dt);
        assert_eq!(hour.succ().hour_form(), "2024-01-16-00");
    }
}
