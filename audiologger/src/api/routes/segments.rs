//! Segment extraction route.

use axum::Router;
use axum::extract::{Path, Query, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tower_http::services::ServeFile;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::error::Error;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/streams/{stream}/segments", get(get_segment))
}

#[derive(Debug, Deserialize)]
struct SegmentQuery {
    start: Option<String>,
    end: Option<String>,
}

async fn get_segment(
    State(state): State<AppState>,
    Path(stream): Path<String>,
    Query(query): Query<SegmentQuery>,
    req: Request,
) -> ApiResult<Response> {
    if !state.config.streams.contains_key(&stream) {
        return Err(ApiError::from(Error::UnknownStream(stream)));
    }

    let start_raw = query
        .start
        .ok_or_else(|| ApiError::bad_request("missing 'start' query parameter"))?;
    let end_raw = query
        .end
        .ok_or_else(|| ApiError::bad_request("missing 'end' query parameter"))?;

    let start = chrono::DateTime::parse_from_rfc3339(&start_raw)
        .map_err(|_| ApiError::bad_request("invalid 'start', expected RFC 3339"))?
        .with_timezone(&state.config.timezone());
    let end = chrono::DateTime::parse_from_rfc3339(&end_raw)
        .map_err(|_| ApiError::bad_request("invalid 'end', expected RFC 3339"))?
        .with_timezone(&state.config.timezone());

    let path = state.extractor.extract(&stream, start, end).await?;

    match ServeFile::new(&path).try_call(req).await {
        Ok(response) => Ok(response.into_response()),
        Err(e) => Err(ApiError::internal(format!("failed to serve segment: {e}"))),
    }
}
