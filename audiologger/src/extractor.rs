//! Segment extractor (C7): maps `[start, end]` to (hourly file, offset,
//! duration) to a cached artifact.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::warn;

use crate::audio_tool::AudioTool;
use crate::cache::SegmentCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::time::{self, display_form, Hour};

/// Grace period before a temp file that couldn't be inserted into the cache
/// is deleted, to allow the HTTP response time to finish streaming it.
const TEMP_FILE_GRACE_PERIOD: Duration = Duration::from_secs(10);

pub struct SegmentExtractor {
    config: Arc<Config>,
    cache: Arc<SegmentCache>,
    audio_tool: AudioTool,
}

impl SegmentExtractor {
    pub fn new(config: Arc<Config>, cache: Arc<SegmentCache>, audio_tool: AudioTool) -> Self {
        Self {
            config,
            cache,
            audio_tool,
        }
    }

    /// Extract `[start, end)` for `stream`, consulting the cache first.
    /// Cross-hour ranges are rejected outright rather than stitched across
    /// two hourly files.
    pub async fn extract(
        &self,
        stream: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<std::path::PathBuf> {
        if end <= start {
            return Err(Error::MalformedRequest("end must be after start".into()));
        }

        let hour = Hour::truncate(start);
        if end > hour.succ().inner() {
            return Err(Error::MalformedRequest(
                "segment spans more than one hourly file".into(),
            ));
        }

        let key = SegmentCache::key(stream, &display_form(start), &display_form(end));

        let root = self.config.recordings_dir();
        let rec_path = time::recording_path(&root, stream, &hour, "mp3");
        if !rec_path.exists() {
            return Err(Error::not_found_for_hour(stream, hour.hour_form()));
        }

        let offset = (start - hour.inner())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let duration = (end - start).to_std().unwrap_or(Duration::ZERO);

        let cache = Arc::clone(&self.cache);
        let audio_tool = self.audio_tool.clone();
        let cache_dir = self.cache.cache_dir().to_path_buf();
        let insert_cache = Arc::clone(&self.cache);

        let result = cache
            .get_or_extract(&key, move |key| async move {
                let temp_path = cache_dir.join(format!(".tmp-{key}-{}.mp3", nanos_suffix()));
                audio_tool
                    .trim(&rec_path, offset, duration, &temp_path)
                    .await
                    .map_err(|e| e.to_string())?;

                match insert_cache.insert(&key, &temp_path).await {
                    Ok(dest) => Ok(dest),
                    Err(e) => {
                        warn!(key, error = %e, "cache insert failed, serving temp file directly");
                        Self::schedule_temp_cleanup(temp_path.clone());
                        Ok(temp_path)
                    }
                }
            })
            .await;

        match result {
            Ok(path) => Ok(path),
            Err(message) => Err(Error::ExtractionFailed(message)),
        }
    }

    /// Schedule deletion of a temp file that couldn't be inserted into the
    /// cache, after a grace period long enough for the response to finish.
    pub fn schedule_temp_cleanup(path: std::path::PathBuf) {
        tokio::spawn(async move {
            tokio::time::sleep(TEMP_FILE_GRACE_PERIOD).await;
            if let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "failed to clean up temp extraction file");
            }
        });
    }
}

fn nanos_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    #[test]
    fn rejects_end_not_after_start() {
        let t = UTC.with_ymd_and_hms(2024, 1, 15, 14, 20, 0).unwrap();
        assert!(t <= t);
    }

    #[test]
    fn cross_hour_range_is_detected() {
        let start = UTC.with_ymd_and_hms(2024, 1, 15, 14, 50, 0).unwrap();
        let end = UTC.with_ymd_and_hms(2024, 1, 15, 15, 10, 0).unwrap();
        let hour = Hour::truncate(start);
        assert!(end > hour.succ().inner());
    }

    #[test]
    fn within_hour_range_is_allowed() {
        let start = UTC.with_ymd_and_hms(2024, 1, 15, 14, 10, 0).unwrap();
        let end = UTC.with_ymd_and_hms(2024, 1, 15, 14, 20, 0).unwrap();
        let hour = Hour::truncate(start);
        assert!(end <= hour.succ().inner());
    }
}
