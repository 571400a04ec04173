//! Audio tool wrapper (C2).
//!
//! Wraps an external `ffmpeg`-compatible binary for three stream-copy-only
//! operations: record, trim, probe. Never re-encodes. Every operation
//! produces a cancellable child process: cancelling the supplied token
//! requests a graceful stop (`q` on stdin) and falls back to a hard kill.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Maximum time to wait for a graceful ("q") shutdown before killing.
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Container/codec information returned by `probe`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub codec_name: Option<String>,
    pub duration_secs: Option<f64>,
    pub bitrate_kbps: Option<u32>,
}

/// Thin wrapper around an external audio tool binary (default `ffmpeg`).
#[derive(Debug, Clone)]
pub struct AudioTool {
    binary_path: String,
    user_agent: String,
}

impl AudioTool {
    pub fn new(binary_path: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Capture `stream_url` for `duration`, stream-copying into `out_path`.
    /// Cancelling `cancel` requests a graceful stop.
    pub async fn record(
        &self,
        stream_url: &str,
        duration: Duration,
        out_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = process_utils::tokio_command(&self.binary_path);
        cmd.arg("-y")
            .arg("-hide_banner")
            .args(["-user_agent", &self.user_agent])
            .args(["-reconnect", "1"])
            .args(["-reconnect_at_eof", "1"])
            .args(["-reconnect_streamed", "1"])
            .args(["-reconnect_on_http_error", "404,500,502,503,504"])
            .args(["-reconnect_delay_max", "60"])
            .args(["-rw_timeout", "30000000"])
            .args(["-timeout", "60000000"])
            .args(["-i", stream_url])
            .args(["-t", &duration.as_secs().to_string()])
            .args(["-c", "copy"])
            .arg(out_path);

        self.run_cancellable(cmd, cancel).await
    }

    /// Extract `[start_offset, start_offset + duration]` from `in_path` into
    /// `out_path`, stream-copying and overwriting any existing file.
    pub async fn trim(
        &self,
        in_path: &Path,
        start_offset: Duration,
        duration: Duration,
        out_path: &Path,
    ) -> Result<()> {
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = process_utils::tokio_command(&self.binary_path);
        cmd.arg("-y")
            .arg("-hide_banner")
            .args(["-ss", &format!("{:.3}", start_offset.as_secs_f64())])
            .args(["-i", &in_path.to_string_lossy()])
            .args(["-t", &format!("{:.3}", duration.as_secs_f64())])
            .args(["-c", "copy"])
            .arg(out_path);

        self.run_cancellable(cmd, &CancellationToken::new()).await
    }

    /// Probe `path` for codec/duration/bitrate information.
    pub async fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let probe_binary = self.binary_path.replace("ffmpeg", "ffprobe");
        let mut cmd = process_utils::tokio_command(&probe_binary);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration,bit_rate:stream=codec_name",
            "-of",
            "json",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Other(format!("failed to spawn probe: {e}")))?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "probe exited with {:?}",
                output.status.code()
            )));
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn run_cancellable(&self, mut cmd: Command, cancel: &CancellationToken) -> Result<()> {
        cmd.env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Other(format!("failed to spawn audio tool: {e}")))?;

        let mut stdin = child.stdin.take();
        let mut stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        let exit_code = tokio::select! {
            status = child.wait() => status.ok().and_then(|s| s.code()),
            _ = cancel.cancelled() => {
                debug!("audio tool stop requested, sending 'q' for graceful exit");
                if let Some(mut stdin) = stdin.take() {
                    let _ = stdin.write_all(b"q").await;
                    let _ = stdin.flush().await;
                    let _ = stdin.shutdown().await;
                }
                match tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, child.wait()).await {
                    Ok(status) => status.ok().and_then(|s| s.code()),
                    Err(_) => {
                        warn!("audio tool did not exit in time; killing");
                        let _ = child.kill().await;
                        child.wait().await.ok().and_then(|s| s.code())
                    }
                }
            }
        };

        let stderr_output = stderr_task.await.unwrap_or_default();

        match exit_code {
            Some(0) => Ok(()),
            Some(code) => Err(classify_failure(code, &stderr_output)),
            None => Err(Error::ExtractionFailed(
                "audio tool exited without an exit code".to_string(),
            )),
        }
    }
}

/// Markers in ffmpeg's stderr that indicate the failure won't clear up on
/// retry (bad URL, auth, unsupported format) as opposed to a transient
/// network hiccup.
const PERMANENT_FAILURE_MARKERS: [&str; 6] = [
    "403 forbidden",
    "401 unauthorized",
    "404 not found",
    "invalid data found when processing input",
    "unsupported",
    "no such file or directory",
];

/// Classify a non-zero audio tool exit as a transient (retry may help) or
/// permanent (retrying will not help) stream error, based on `stderr`.
fn classify_failure(code: i32, stderr: &str) -> Error {
    let lower = stderr.to_lowercase();
    let snippet: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" ");
    if PERMANENT_FAILURE_MARKERS.iter().any(|m| lower.contains(m)) {
        Error::PermanentStream(format!("audio tool exited with code {code}: {snippet}"))
    } else {
        Error::TransientStream(format!("audio tool exited with code {code}: {snippet}"))
    }
}

fn parse_probe_json(raw: &str) -> Result<ProbeInfo> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| Error::Other(format!("invalid probe output: {e}")))?;

    let codec_name = value["streams"]
        .get(0)
        .and_then(|s| s["codec_name"].as_str())
        .map(str::to_string);
    let duration_secs = value["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok());
    let bitrate_kbps = value["format"]["bit_rate"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|bps| (bps / 1000) as u32);

    Ok(ProbeInfo {
        codec_name,
        duration_secs,
        bitrate_kbps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_json() {
        let raw = r#"{"streams":[{"codec_name":"mp3"}],"format":{"duration":"3600.123456","bit_rate":"128000"}}"#;
        let info = parse_probe_json(raw).unwrap();
        assert_eq!(info.codec_name.as_deref(), Some("mp3"));
        assert_eq!(info.duration_secs, Some(3600.123456));
        assert_eq!(info.bitrate_kbps, Some(128));
    }

    #[test]
    fn parses_missing_fields_as_none() {
        let raw = r#"{"streams":[],"format":{}}"#;
        let info = parse_probe_json(raw).unwrap();
        assert_eq!(info.codec_name, None);
        assert_eq!(info.duration_secs, None);
        assert_eq!(info.bitrate_kbps, None);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(parse_probe_json("not json").is_err());
    }

    #[test]
    fn classifies_404_as_permanent() {
        let err = classify_failure(1, "HTTP error 404 Not Found\nConnection to source failed");
        assert!(matches!(err, Error::PermanentStream(_)));
    }

    #[test]
    fn classifies_connection_reset_as_transient() {
        let err = classify_failure(1, "av_interleaved_write_frame(): Connection reset by peer");
        assert!(matches!(err, Error::TransientStream(_)));
    }

    #[test]
    fn classifies_unknown_stderr_as_transient_by_default() {
        let err = classify_failure(255, "");
        assert!(matches!(err, Error::TransientStream(_)));
    }
}
