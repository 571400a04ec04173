//! Structured logging setup.
//!
//! Layers a console writer with a non-blocking daily-rolling file writer
//! under a single `EnvFilter`, falling back to a crate-scoped default
//! directive when `RUST_LOG` is unset.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "audiologger=info,tower_http=info";

/// Initialize logging. Returns a `WorkerGuard` that must be kept alive for
/// the lifetime of the process (dropping it flushes and stops the writer).
pub fn init_logging(log_dir: &Path) -> crate::error::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "audiologger.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| crate::error::Error::Other(format!("failed to init logging: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_mentions_crate() {
        assert!(DEFAULT_LOG_FILTER.contains("audiologger=info"));
    }
}
