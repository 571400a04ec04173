//! Binary entry point: CLI parsing, component wiring, and the top-level
//! cancellation scope.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use audiologger::api::{ApiServer, ApiServerConfig, AppState};
use audiologger::audio_tool::AudioTool;
use audiologger::cache::SegmentCache;
use audiologger::config::Config;
use audiologger::extractor::SegmentExtractor;
use audiologger::logging;
use audiologger::recorder::Recorder;
use audiologger::retention::RetentionCleaner;
use audiologger::scheduler::Scheduler;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Default user agent sent to upstream streams.
const DEFAULT_USER_AGENT: &str = concat!("audiologger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Parser)]
#[command(name = "audiologger", version, about = "Hourly recorder and segment server for live audio streams")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "streams.json")]
    config: PathBuf,

    /// Record once for every configured stream, then exit.
    #[arg(long)]
    test_record: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    let _guard = match logging::init_logging(&config.recordings_dir()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(1);
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "starting audiologger");

    if let Err(e) = run(config, cli.test_record).await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(config: Arc<Config>, test_record_once: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let ffmpeg_bin = std::env::var("AUDIOLOGGER_FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string());
    let audio_tool = AudioTool::new(ffmpeg_bin, DEFAULT_USER_AGENT);
    let http_client = reqwest::Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .build()?;

    let retention = Arc::new(RetentionCleaner::new(Arc::clone(&config)));
    let recorder = Arc::new(Recorder::new(
        Arc::clone(&config),
        audio_tool.clone(),
        http_client,
        Arc::clone(&retention),
    ));

    if test_record_once {
        info!("test-record: recording once for every configured stream");
        recorder.record_all(cancel.clone()).await;
        return Ok(());
    }

    let cache = Arc::new(SegmentCache::new(
        config.cache_dir(),
        std::time::Duration::from_secs(config.server.cache_ttl_secs),
    ));
    tokio::fs::create_dir_all(cache.cache_dir()).await?;
    cache.spawn_sweep_task(std::time::Duration::from_secs(3600), cancel.clone());

    let extractor = Arc::new(SegmentExtractor::new(
        Arc::clone(&config),
        Arc::clone(&cache),
        audio_tool,
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&config),
        Arc::clone(&recorder),
        Arc::clone(&retention),
    ));
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let state = AppState::new(Arc::clone(&config), recorder, cache, extractor);
    let server = ApiServer::new(
        ApiServerConfig {
            port: config.port,
            shutdown_timeout: std::time::Duration::from_secs(config.server.shutdown_timeout_secs),
        },
        state,
    );

    let server_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { server.run(cancel).await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, shutting down");
        }
    }
    cancel.cancel();

    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "scheduler task panicked during shutdown");
    }
    match server_task.await {
        Ok(Err(e)) => warn!(error = %e, "HTTP surface exited with an error"),
        Err(e) => warn!(error = %e, "HTTP surface task panicked during shutdown"),
        Ok(Ok(())) => {}
    }

    info!("audiologger shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
