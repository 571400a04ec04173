//! Recorder (C4): per-stream capture with retry/backoff, validation,
//! atomic publication, and per-stream stats.

mod stats;

pub use stats::StreamStats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio_tool::AudioTool;
use crate::bitrate;
use crate::config::{Config, StreamConfig};
use crate::error::{Error, Result};
use crate::metadata;
use crate::retention::RetentionCleaner;
use crate::time::{self, Hour};

/// Maximum number of record attempts per `(stream, hour)`.
const MAX_ATTEMPTS: u32 = 3;

/// Additional per-attempt timeout budget, multiplied by the attempt number.
const PER_ATTEMPT_TIMEOUT_STEP: Duration = Duration::from_secs(30);

/// Backoff between attempts, multiplied by the attempt number (5s, 10s, ...).
const BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Result of validating a recording's size against its expected bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeValidation {
    /// Within `[0.8E, 1.2E]`.
    Ok,
    /// Above `1.2E`: accepted, but worth a warning.
    AcceptedOverage,
    /// Below `0.8E`: fails validation.
    Fail,
}

/// Validate `actual_bytes` against the expected size for `bitrate_kbps` over
/// `duration`.
fn validate_size(actual_bytes: u64, bitrate_kbps: u32, duration: Duration) -> SizeValidation {
    let expected = (bitrate_kbps as f64) * 1024.0 * duration.as_secs_f64() / 8.0;
    let actual = actual_bytes as f64;
    if actual < 0.8 * expected {
        SizeValidation::Fail
    } else if actual > 1.2 * expected {
        SizeValidation::AcceptedOverage
    } else {
        SizeValidation::Ok
    }
}

async fn validate_existing(path: &std::path::Path, bitrate_kbps: u32, duration: Duration) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => !matches!(
            validate_size(meta.len(), bitrate_kbps, duration),
            SizeValidation::Fail
        ),
        Err(_) => false,
    }
}

/// Per-stream capture engine, fanning out one independent task per stream
/// on each hourly tick.
pub struct Recorder {
    config: Arc<Config>,
    audio_tool: AudioTool,
    http_client: reqwest::Client,
    stats: DashMap<String, StreamStats>,
    retention: Arc<RetentionCleaner>,
}

impl Recorder {
    pub fn new(
        config: Arc<Config>,
        audio_tool: AudioTool,
        http_client: reqwest::Client,
        retention: Arc<RetentionCleaner>,
    ) -> Self {
        Self {
            config,
            audio_tool,
            http_client,
            stats: DashMap::new(),
            retention,
        }
    }

    /// Snapshot of all per-stream stats.
    pub fn stats(&self) -> HashMap<String, StreamStats> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn stats_for(&self, stream: &str) -> Option<StreamStats> {
        self.stats.get(stream).map(|s| s.clone())
    }

    /// Fan out one independent recording task per configured stream for the
    /// current hour. Individual stream failures do not abort siblings.
    pub async fn record_all(self: &Arc<Self>, cancel: CancellationToken) {
        let hour = time::current_hour(self.config.timezone());
        let tasks: Vec<_> = self
            .config
            .streams
            .iter()
            .map(|(name, stream_config)| {
                let recorder = Arc::clone(self);
                let name = name.clone();
                let stream_config = stream_config.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    recorder
                        .record_stream(&name, &stream_config, hour, cancel)
                        .await
                })
            })
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "recording task panicked");
            }
        }
    }

    /// Record a single `(stream, hour)`, retrying with backoff on failure.
    async fn record_stream(
        &self,
        name: &str,
        stream_config: &StreamConfig,
        hour: Hour,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.stats.insert(name.to_string(), StreamStats::started());

        let bitrate_kbps = bitrate::detect(&self.http_client, &stream_config.stream_url).await;
        if let Some(mut entry) = self.stats.get_mut(name) {
            entry.detected_bitrate_kbps = Some(bitrate_kbps);
        }

        let root = self.config.recordings_dir();
        let stream_dir = time::stream_dir(&root, name);
        tokio::fs::create_dir_all(&stream_dir).await?;

        {
            let retention = Arc::clone(&self.retention);
            let name = name.to_string();
            tokio::spawn(async move { retention.clean(&name).await });
        }

        let out_path = time::recording_path(&root, name, &hour, "mp3");
        let duration = stream_config.record_duration();

        if out_path.exists() {
            if validate_existing(&out_path, bitrate_kbps, duration).await {
                info!(stream = name, hour = %hour.hour_form(), "already recorded");
                return Ok(());
            }
            warn!(stream = name, path = %out_path.display(), "existing recording failed validation, removing");
            let _ = tokio::fs::remove_file(&out_path).await;
        }

        {
            let stream_config = stream_config.clone();
            let name = name.to_string();
            let root = root.clone();
            tokio::spawn(async move {
                metadata::fetch(&name, &stream_config, &root, hour).await;
            });
        }

        let temp_path = time::temp_recording_path(&root, name, &hour);
        let mut last_error: Option<Error> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(mut entry) = self.stats.get_mut(name) {
                entry.attempts = attempt;
            }

            let per_attempt_timeout = duration + PER_ATTEMPT_TIMEOUT_STEP * attempt;
            let record_fut = self.audio_tool.record(
                &stream_config.stream_url,
                duration,
                &temp_path,
                &cancel,
            );

            let mut is_permanent = false;
            match tokio::time::timeout(per_attempt_timeout, record_fut).await {
                Ok(Ok(())) => {
                    last_error = None;
                    break;
                }
                Ok(Err(e)) => {
                    is_permanent = matches!(e, Error::PermanentStream(_));
                    last_error = Some(e);
                }
                Err(_) => last_error = Some(Error::TransientStream("record attempt timed out".into())),
            }

            if is_permanent {
                warn!(stream = name, hour = %hour.hour_form(), "permanent stream error, not retrying");
                break;
            }

            if attempt < MAX_ATTEMPTS {
                let backoff = BACKOFF_STEP * attempt;
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => {
                        last_error = Some(Error::Cancelled);
                        break;
                    }
                }
            }
        }

        if let Some(e) = last_error {
            self.record_failure(name, &e);
            return Err(e);
        }

        match validate_size(
            tokio::fs::metadata(&temp_path).await?.len(),
            bitrate_kbps,
            duration,
        ) {
            SizeValidation::Fail => {
                let e = Error::Validation(format!(
                    "recording for {name} at {} failed size validation",
                    hour.hour_form()
                ));
                let _ = tokio::fs::remove_file(&temp_path).await;
                self.record_failure(name, &e);
                return Err(e);
            }
            SizeValidation::AcceptedOverage => {
                warn!(stream = name, hour = %hour.hour_form(), "recording larger than expected, accepting");
            }
            SizeValidation::Ok => {}
        }

        tokio::fs::rename(&temp_path, &out_path)
            .await
            .map_err(|e| Error::Disk(format!("rename {} -> {}: {e}", temp_path.display(), out_path.display())))?;

        info!(stream = name, hour = %hour.hour_form(), path = %out_path.display(), "recorded");
        Ok(())
    }

    fn record_failure(&self, name: &str, e: &Error) {
        if let Some(mut entry) = self.stats.get_mut(name) {
            entry.last_error = Some(e.to_string());
        }
        warn!(stream = name, error = %e, "recording failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_within_tolerance_passes() {
        let duration = Duration::from_secs(3600);
        let expected = 128.0 * 1024.0 * 3600.0 / 8.0;
        assert_eq!(
            validate_size(expected as u64, 128, duration),
            SizeValidation::Ok
        );
    }

    #[test]
    fn size_below_eighty_percent_fails() {
        let duration = Duration::from_secs(3600);
        let expected = 128.0 * 1024.0 * 3600.0 / 8.0;
        assert_eq!(
            validate_size((expected * 0.79) as u64, 128, duration),
            SizeValidation::Fail
        );
    }

    #[test]
    fn size_above_120_percent_is_accepted_with_warning() {
        let duration = Duration::from_secs(3600);
        let expected = 128.0 * 1024.0 * 3600.0 / 8.0;
        assert_eq!(
            validate_size((expected * 1.5) as u64, 128, duration),
            SizeValidation::AcceptedOverage
        );
    }

    #[test]
    fn zero_bytes_fails() {
        assert_eq!(
            validate_size(0, 128, Duration::from_secs(3600)),
            SizeValidation::Fail
        );
    }

    #[test]
    fn boundary_at_exactly_eighty_percent_passes() {
        let duration = Duration::from_secs(3600);
        let expected = 128.0 * 1024.0 * 3600.0 / 8.0;
        assert_eq!(
            validate_size((expected * 0.8) as u64, 128, duration),
            SizeValidation::Ok
        );
    }
}
