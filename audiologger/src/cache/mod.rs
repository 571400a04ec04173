//! Segment cache (C6): a content-addressed on-disk cache with TTL,
//! single-flight, and a periodic sweep.
//!
//! The single-flight guard uses an `OnceCell` + `Notify` pair: while an
//! extraction is in flight for a key, late arrivals await the `Notify`
//! instead of launching a parallel extraction that would race to write the
//! same output path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Notify, OnceCell};
use tracing::{debug, warn};

/// An in-memory cache entry. `created_at <= accessed_at` always holds.
#[derive(Debug, Clone)]
struct CacheEntry {
    file_path: PathBuf,
    created_at: Instant,
    accessed_at: Instant,
}

/// Result of a single in-flight extraction, shared by every waiter for the
/// same key.
type InFlightResult = Result<PathBuf, String>;

struct InFlightState {
    result: OnceCell<InFlightResult>,
    notify: Notify,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: InFlightResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> InFlightResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            self.notify.notified().await;
        }
    }
}

/// Aggregate cache statistics (for the `/api/v1/system/cache` endpoint).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub total_bytes: u64,
    pub cache_dir: String,
    pub ttl_hours: f64,
}

/// Content-addressed on-disk cache of extracted segments.
pub struct SegmentCache {
    cache_dir: PathBuf,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Arc<InFlightState>>,
}

impl SegmentCache {
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Self {
        Self {
            cache_dir,
            ttl,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Compute the cache key for `(stream, start, end)` from their display
    /// forms.
    pub fn key(stream: &str, start_display: &str, end_display: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(stream.as_bytes());
        hasher.update(b"-");
        hasher.update(start_display.as_bytes());
        hasher.update(b"-");
        hasher.update(end_display.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Look up `key`. Evicts and misses on TTL expiry or if the file has
    /// vanished.
    pub async fn lookup(&self, key: &str) -> Option<PathBuf> {
        let hit = {
            let mut entry = self.entries.get_mut(key)?;
            if entry.created_at.elapsed() > self.ttl {
                None
            } else {
                entry.accessed_at = Instant::now();
                Some(entry.file_path.clone())
            }
        };

        match hit {
            Some(path) if tokio::fs::metadata(&path).await.is_ok() => Some(path),
            _ => {
                self.entries.remove(key);
                None
            }
        }
    }

    /// Atomically rename `temp_path` into the cache directory under `key`
    /// and record the entry.
    pub async fn insert(&self, key: &str, temp_path: &Path) -> std::io::Result<PathBuf> {
        let dest = self.cache_dir.join(format!("{key}.mp3"));
        tokio::fs::rename(temp_path, &dest).await?;
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                file_path: dest.clone(),
                created_at: now,
                accessed_at: now,
            },
        );
        Ok(dest)
    }

    /// Run a producer exactly once per key, even under concurrent requests
    /// for the same `(stream, start, end)`.
    ///
    /// `produce` is invoked with the target cache key and is responsible
    /// for both extraction and insertion (via [`SegmentCache::insert`]); it
    /// returns the final path to serve, or an error message.
    pub async fn get_or_extract<F, Fut>(&self, key: &str, produce: F) -> Result<PathBuf, String>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<PathBuf, String>>,
    {
        if let Some(path) = self.lookup(key).await {
            return Ok(path);
        }

        let (state, is_leader) = match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                (Arc::clone(existing.get()), false)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let state = Arc::new(InFlightState::new());
                slot.insert(Arc::clone(&state));
                (state, true)
            }
        };

        if !is_leader {
            return state.wait().await;
        }

        let result = produce(key.to_string()).await;
        state.set_result(result.clone());
        self.in_flight.remove(key);
        result
    }

    /// Two-phase sweep: collect all expired keys, then delete their files
    /// and entries. Splitting collection from deletion avoids mutating the
    /// map while iterating it.
    pub async fn sweep(&self) {
        let expired: Vec<(String, PathBuf)> = self
            .entries
            .iter()
            .filter(|e| e.created_at.elapsed() > self.ttl)
            .map(|e| (e.key().clone(), e.file_path.clone()))
            .collect();

        for (key, path) in &expired {
            if let Err(e) = tokio::fs::remove_file(path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(key, path = %path.display(), error = %e, "sweep: failed to delete cache file");
            }
            self.entries.remove(key);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "cache sweep removed expired entries");
        }
    }

    /// Spawn a background task that sweeps once per hour until `cancel`
    /// fires.
    pub fn spawn_sweep_task(
        self: &Arc<Self>,
        interval: Duration,
        cancel: tokio_util::sync::CancellationToken,
    ) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => cache.sweep().await,
                }
            }
        });
    }

    pub fn stats(&self) -> CacheStats {
        let total_entries = self.entries.len();
        let valid_entries = self
            .entries
            .iter()
            .filter(|e| e.created_at.elapsed() <= self.ttl)
            .count();
        let total_bytes = self
            .entries
            .iter()
            .filter_map(|e| std::fs::metadata(&e.file_path).ok())
            .map(|m| m.len())
            .sum();

        CacheStats {
            total_entries,
            valid_entries,
            total_bytes,
            cache_dir: self.cache_dir.to_string_lossy().to_string(),
            ttl_hours: self.ttl.as_secs_f64() / 3600.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn new_cache(ttl: Duration) -> (tempfile::TempDir, Arc<SegmentCache>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SegmentCache::new(dir.path().to_path_buf(), ttl));
        (dir, cache)
    }

    #[test]
    fn key_is_deterministic_and_depends_on_inputs() {
        let a = SegmentCache::key("zw", "2024-01-15 14:10", "2024-01-15 14:20");
        let b = SegmentCache::key("zw", "2024-01-15 14:10", "2024-01-15 14:20");
        let c = SegmentCache::key("zw", "2024-01-15 14:10", "2024-01-15 14:21");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn insert_then_lookup_hits() {
        let (dir, cache) = new_cache(Duration::from_secs(3600)).await;
        let temp = dir.path().join(".tmp-abc");
        tokio::fs::write(&temp, b"audio").await.unwrap();

        let path = cache.insert("k1", &temp).await.unwrap();
        assert!(path.exists());

        let hit = cache.lookup("k1").await;
        assert_eq!(hit, Some(path));
    }

    #[tokio::test]
    async fn lookup_misses_on_unknown_key() {
        let (_dir, cache) = new_cache(Duration::from_secs(3600)).await;
        assert_eq!(cache.lookup("missing").await, None);
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries_and_files() {
        let (dir, cache) = new_cache(Duration::from_millis(10)).await;
        let temp = dir.path().join(".tmp-xyz");
        tokio::fs::write(&temp, b"audio").await.unwrap();
        let path = cache.insert("k2", &temp).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.sweep().await;

        assert!(!path.exists());
        assert_eq!(cache.lookup("k2").await, None);
    }

    #[tokio::test]
    async fn lookup_evicts_when_file_vanishes_externally() {
        let (dir, cache) = new_cache(Duration::from_secs(3600)).await;
        let temp = dir.path().join(".tmp-gone");
        tokio::fs::write(&temp, b"audio").await.unwrap();
        let path = cache.insert("k3", &temp).await.unwrap();

        tokio::fs::remove_file(&path).await.unwrap();
        assert_eq!(cache.lookup("k3").await, None);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_extract_only_once() {
        let (dir, cache) = new_cache(Duration::from_secs(3600)).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let dir_path = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_extract("shared-key", move |key| {
                        let calls = Arc::clone(&calls);
                        let dir_path = dir_path.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // Simulate extraction latency so requests overlap.
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            let temp = dir_path.join(format!(".tmp-{key}"));
                            tokio::fs::write(&temp, b"audio").await.unwrap();
                            Ok(temp)
                        }
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = &results[0];
        assert!(results.iter().all(|p| p == first));
    }
}
