//! Retention cleaner (C5): age-based deletion of old recordings and
//! metadata.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::config::Config;
use crate::time;

/// Walks a stream's directory and deletes every regular file whose
/// last-modified time is before `now - keep_days`. Per-file errors are
/// logged and skipped, never propagated.
pub struct RetentionCleaner {
    config: Arc<Config>,
}

impl RetentionCleaner {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Clean a single stream's directory using its configured (or global)
    /// `keep_days`.
    pub async fn clean(&self, stream: &str) {
        let keep_days = self.config.keep_days_for(stream);
        let dir = time::stream_dir(&self.config.recordings_dir(), stream);
        self.clean_dir(&dir, keep_days).await;
    }

    /// Clean every configured stream's directory.
    pub async fn clean_all(&self) {
        let names: Vec<String> = self.config.streams.keys().cloned().collect();
        for name in names {
            self.clean(&name).await;
        }
    }

    async fn clean_dir(&self, dir: &PathBuf, keep_days: u32) {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(keep_days as u64 * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "retention: cannot read directory");
                return;
            }
        };

        let mut deleted = 0u32;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "retention: error walking directory");
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "retention: cannot stat file");
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "retention: cannot read mtime");
                    continue;
                }
            };

            if modified < cutoff
                && let Err(e) = tokio::fs::remove_file(&path).await
            {
                warn!(path = %path.display(), error = %e, "retention: failed to delete file");
            } else if modified < cutoff {
                deleted += 1;
            }
        }

        if deleted > 0 {
            debug!(dir = %dir.display(), deleted, "retention: cleaned up old files");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    fn config_with_dir(root: &std::path::Path, keep_days: u32) -> Arc<Config> {
        Arc::new(Config {
            recordings_dir: root.to_string_lossy().to_string(),
            port: 8080,
            keep_days,
            timezone: "UTC".to_string(),
            server: Default::default(),
            streams: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn deletes_old_files_keeps_recent_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let stream_dir = tmp.path().join("zw");
        tokio::fs::create_dir_all(&stream_dir).await.unwrap();

        let old = stream_dir.join("2024-01-10-00.mp3");
        let recent = stream_dir.join("2024-01-15-13.mp3");
        tokio::fs::write(&old, b"old").await.unwrap();
        tokio::fs::write(&recent, b"recent").await.unwrap();

        // Backdate the "old" file's mtime by 5 days.
        let five_days_ago = SystemTime::now() - StdDuration::from_secs(5 * 86_400);
        filetime_touch(&old, five_days_ago);

        let config = config_with_dir(tmp.path(), 1);
        let cleaner = RetentionCleaner::new(config);
        cleaner.clean("zw").await;

        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_with_dir(tmp.path(), 31);
        let cleaner = RetentionCleaner::new(config);
        cleaner.clean("nonexistent").await;
    }

    /// Minimal mtime backdating without pulling in the `filetime` crate:
    /// reopen with a set_modified via std::fs on platforms that support it.
    fn filetime_touch(path: &std::path::Path, time: SystemTime) {
        if let Ok(file) = std::fs::File::open(path) {
            let _ = file.set_modified(time);
        }
    }
}
