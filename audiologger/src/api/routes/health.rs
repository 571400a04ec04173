//! Liveness and readiness routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::models::{ApiEnvelope, HealthResponse, ReadinessCheck, ReadinessResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let recordings_dir = state.config.recordings_dir();
    let fs_ok = recordings_dir.exists();

    let checks = vec![ReadinessCheck {
        name: "recordings_dir",
        healthy: fs_ok,
        detail: (!fs_ok).then(|| format!("{} does not exist", recordings_dir.display())),
    }];
    let ready = checks.iter().all(|c| c.healthy);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiEnvelope::ok(ReadinessResponse { ready, checks })))
}
