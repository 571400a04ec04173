//! System-wide stats routes.

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;

use crate::api::models::{ApiEnvelope, SystemStatsResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/system/cache", get(cache_stats))
        .route("/api/v1/system/stats", get(system_stats))
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiEnvelope::ok(state.cache.stats()))
}

async fn system_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiEnvelope::ok(SystemStatsResponse {
        streams: state.recorder.stats(),
        cache: state.cache.stats(),
    }))
}
