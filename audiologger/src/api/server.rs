//! API server setup: application state, router assembly, and graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{MakeSpan, OnResponse, TraceLayer};
use tracing::Span;

use crate::api::routes;
use crate::cache::SegmentCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::SegmentExtractor;
use crate::recorder::Recorder;

/// HTTP server tuning knobs, derived from `config.server`.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub port: u16,
    pub shutdown_timeout: Duration,
}

/// Shared, read-only application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub config: Arc<Config>,
    pub recorder: Arc<Recorder>,
    pub cache: Arc<SegmentCache>,
    pub extractor: Arc<SegmentExtractor>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        recorder: Arc<Recorder>,
        cache: Arc<SegmentCache>,
        extractor: Arc<SegmentExtractor>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            config,
            recorder,
            cache,
            extractor,
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    fn build_router(&self) -> Router {
        let router = routes::create_router(self.state.clone());

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    tower_http::trace::DefaultMakeSpan::new()
                        .level(tracing::Level::INFO)
                        .make_span(req)
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        tower_http::trace::DefaultOnResponse::new()
                            .level(tracing::Level::INFO)
                            .on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Bind and serve until `cancel` fires, then drain in-flight connections
    /// for up to the configured shutdown timeout before forcibly closing.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "HTTP surface listening");

        let shutdown_timeout = self.config.shutdown_timeout;
        let shutdown_cancel = cancel.clone();
        let mut serve_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_cancel.cancelled().await;
                })
                .await
        });

        cancel.cancelled().await;
        tracing::info!(?shutdown_timeout, "HTTP surface draining");

        match tokio::time::timeout(shutdown_timeout, &mut serve_task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Err(join_err)) => Err(Error::Other(format!(
                "HTTP surface task panicked: {join_err}"
            ))),
            Err(_) => {
                tracing::warn!(
                    ?shutdown_timeout,
                    "graceful drain exceeded timeout, forcing close"
                );
                serve_task.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_carries_shutdown_timeout() {
        let config = ApiServerConfig {
            port: 8080,
            shutdown_timeout: Duration::from_secs(10),
        };
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }
}
