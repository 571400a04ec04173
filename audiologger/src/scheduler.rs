//! Scheduler (C8): cron-driven hourly recording and daily retention
//! cleanup, plus a start-up sweep for stranded in-flight artifacts.

use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::recorder::Recorder;
use crate::retention::RetentionCleaner;

/// Minute 0 of every hour.
const HOURLY_CRON: &str = "0 0 * * * *";

/// Midnight every day.
const DAILY_CRON: &str = "0 0 0 * * *";

pub struct Scheduler {
    config: Arc<Config>,
    recorder: Arc<Recorder>,
    retention: Arc<RetentionCleaner>,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, recorder: Arc<Recorder>, retention: Arc<RetentionCleaner>) -> Self {
        Self {
            config,
            recorder,
            retention,
        }
    }

    /// Remove stranded `.rec` files left behind by a prior run that was
    /// killed mid-capture. A `.rec` is never resumed; the next scheduled
    /// tick records a fresh one.
    pub async fn sweep_stranded_artifacts(&self) {
        let root = self.config.recordings_dir();
        let names: Vec<String> = self.config.streams.keys().cloned().collect();

        for name in names {
            let dir = crate::time::stream_dir(&root, &name);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("rec") {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to remove stranded .rec file");
                    } else {
                        info!(path = %path.display(), "removed stranded .rec file from prior run");
                    }
                }
            }
        }
    }

    /// Run both cron loops until `cancel` fires, then return once any
    /// in-flight triggered work has observed the token.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.sweep_stranded_artifacts().await;

        let hourly = {
            let scheduler = Arc::clone(&self);
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run_hourly_loop(cancel).await })
        };

        let daily = {
            let scheduler = Arc::clone(&self);
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run_daily_loop(cancel).await })
        };

        let _ = tokio::join!(hourly, daily);
    }

    async fn run_hourly_loop(&self, cancel: CancellationToken) {
        let schedule = match cron::Schedule::from_str(HOURLY_CRON) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(error = %e, "invalid hourly cron expression, scheduler loop exiting");
                return;
            }
        };
        let tz = self.config.timezone();

        loop {
            let now = chrono::Utc::now().with_timezone(&tz);
            let Some(next) = schedule.after(&now).next() else {
                warn!("hourly cron schedule has no future occurrences");
                return;
            };

            let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("hourly scheduler stopping, no new triggers");
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {
                    self.recorder.record_all(cancel.clone()).await;
                }
            }
        }
    }

    async fn run_daily_loop(&self, cancel: CancellationToken) {
        let schedule = match cron::Schedule::from_str(DAILY_CRON) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(error = %e, "invalid daily cron expression, scheduler loop exiting");
                return;
            }
        };
        let tz = self.config.timezone();

        loop {
            let now = chrono::Utc::now().with_timezone(&tz);
            let Some(next) = schedule.after(&now).next() else {
                warn!("daily cron schedule has no future occurrences");
                return;
            };

            let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("daily scheduler stopping, no new triggers");
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {
                    self.retention.clean_all().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[test]
    fn hourly_expression_parses_and_fires_at_minute_zero() {
        let schedule = cron::Schedule::from_str(super::HOURLY_CRON).unwrap();
        let now = chrono::Utc::now();
        let next = schedule.after(&now).next().unwrap();
        assert_eq!(next.format("%M").to_string(), "00");
    }

    #[test]
    fn daily_expression_parses_and_fires_at_midnight() {
        let schedule = cron::Schedule::from_str(super::DAILY_CRON).unwrap();
        let now = chrono::Utc::now();
        let next = schedule.after(&now).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
