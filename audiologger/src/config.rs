//! Configuration loading.
//!
//! The configuration file is decoded strictly: unknown fields are rejected.
//! Defaults are applied by serde itself, then the value is never mutated
//! again for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_recordings_dir() -> String {
    "/var/audio".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_keep_days() -> u32 {
    31
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_record_duration_secs() -> u64 {
    3600
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_write_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Per-stream configuration, immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub stream_url: String,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub metadata_path: Option<String>,
    #[serde(default)]
    pub parse_metadata: bool,
    #[serde(default)]
    pub keep_days: Option<u32>,
    #[serde(default = "default_record_duration_secs", rename = "record_duration")]
    pub record_duration_secs: u64,
}

impl StreamConfig {
    pub fn record_duration(&self) -> Duration {
        Duration::from_secs(self.record_duration_secs)
    }
}

/// HTTP server and cache tuning knobs, nested under `server` in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_cache_ttl_secs", rename = "cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_read_timeout_secs", rename = "read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs", rename = "write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs", rename = "shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_ttl_secs: default_cache_ttl_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_server_section() -> ServerSection {
    ServerSection::default()
}

/// Top-level configuration, decoded once at startup from the `--config` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keep_days")]
    pub keep_days: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_server_section")]
    pub server: ServerSection,
    #[serde(default)]
    pub streams: HashMap<String, StreamConfig>,
}

impl Config {
    /// Load and strictly decode configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.streams.is_empty() {
            return Err(Error::config("no streams configured"));
        }
        let _: chrono_tz::Tz = self
            .timezone
            .parse()
            .map_err(|_| Error::config(format!("invalid timezone '{}'", self.timezone)))?;
        Ok(())
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    pub fn recordings_dir(&self) -> PathBuf {
        PathBuf::from(&self.recordings_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.recordings_dir().join(&self.server.cache_dir)
    }

    pub fn keep_days_for(&self, stream: &str) -> u32 {
        self.streams
            .get(stream)
            .and_then(|s| s.keep_days)
            .unwrap_or(self.keep_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_absent() {
        let json = r#"{"streams":{"zw":{"stream_url":"http://s/z.mp3"}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.recordings_dir, "/var/audio");
        assert_eq!(config.port, 8080);
        assert_eq!(config.keep_days, 31);
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.server.cache_ttl_secs, 3600);
        assert_eq!(
            config.streams["zw"].record_duration(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let json = r#"{"streams":{},"bogus":1}"#;
        let err = serde_json::from_str::<Config>(json).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn unknown_stream_field_is_rejected() {
        let json = r#"{"streams":{"zw":{"stream_url":"http://s","bogus":1}}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn empty_streams_fails_validation() {
        let json = r#"{"streams":{}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_timezone_fails_validation() {
        let json = r#"{"timezone":"Not/AZone","streams":{"zw":{"stream_url":"http://s"}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn per_stream_keep_days_overrides_global() {
        let json = r#"{"keep_days":31,"streams":{"zw":{"stream_url":"http://s","keep_days":7}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.keep_days_for("zw"), 7);
        assert_eq!(config.keep_days_for("other"), 31);
    }
}
