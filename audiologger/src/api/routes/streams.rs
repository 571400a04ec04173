//! Stream, recording, and metadata routes.

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::services::ServeFile;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ApiEnvelope, MetadataResponse, RecordingDescriptor, RecordingInfo, StreamDescriptor};
use crate::api::server::AppState;
use crate::error::Error;
use crate::time;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/streams", get(list_streams))
        .route("/api/v1/streams/{stream}", get(get_stream))
        .route("/api/v1/streams/{stream}/recordings", get(list_recordings))
        .route(
            "/api/v1/streams/{stream}/recordings/{hour}",
            get(get_recording),
        )
        .route(
            "/api/v1/streams/{stream}/recordings/{hour}/download",
            get(download_recording),
        )
        .route(
            "/api/v1/streams/{stream}/recordings/{hour}/metadata",
            get(get_recording_metadata),
        )
}

fn descriptor_for(state: &AppState, name: &str) -> ApiResult<StreamDescriptor> {
    let stream = state
        .config
        .streams
        .get(name)
        .ok_or_else(|| ApiError::from(Error::UnknownStream(name.to_string())))?;

    Ok(StreamDescriptor {
        name: name.to_string(),
        stream_url: stream.stream_url.clone(),
        record_duration_secs: stream.record_duration_secs,
        keep_days: state.config.keep_days_for(name),
        has_metadata_source: stream.metadata_url.is_some(),
    })
}

async fn list_streams(State(state): State<AppState>) -> Response {
    let descriptors: Vec<StreamDescriptor> = state
        .config
        .streams
        .keys()
        .filter_map(|name| descriptor_for(&state, name).ok())
        .collect();
    let count = descriptors.len();
    axum::Json(ApiEnvelope::ok_list(descriptors, count)).into_response()
}

async fn get_stream(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> ApiResult<Response> {
    let descriptor = descriptor_for(&state, &stream)?;
    Ok(axum::Json(ApiEnvelope::ok(descriptor)).into_response())
}

async fn list_recordings(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> ApiResult<Response> {
    descriptor_for(&state, &stream)?;

    let dir = time::stream_dir(&state.config.recordings_dir(), &stream);
    let mut recordings = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext == "rec" || ext == "meta" {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            recordings.push(RecordingDescriptor {
                hour: stem.to_string(),
                size_bytes,
            });
        }
    }
    recordings.sort_by(|a, b| a.hour.cmp(&b.hour));

    let count = recordings.len();
    Ok(axum::Json(ApiEnvelope::ok_list(recordings, count)).into_response())
}

async fn get_recording(
    State(state): State<AppState>,
    Path((stream, hour)): Path<(String, String)>,
) -> ApiResult<Response> {
    descriptor_for(&state, &stream)?;
    let hour = time::parse_hour(&hour, state.config.timezone())?;
    let root = state.config.recordings_dir();
    let path = time::recording_path(&root, &stream, &hour, "mp3");

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::from(Error::not_found_for_hour(&stream, hour.hour_form())))?;

    Ok(axum::Json(ApiEnvelope::ok(RecordingInfo {
        stream,
        hour: hour.hour_form(),
        size_bytes: metadata.len(),
        path: path.to_string_lossy().to_string(),
    }))
    .into_response())
}

async fn download_recording(
    State(state): State<AppState>,
    Path((stream, hour)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Response> {
    descriptor_for(&state, &stream)?;
    let hour = time::parse_hour(&hour, state.config.timezone())?;
    let root = state.config.recordings_dir();
    let path = time::recording_path(&root, &stream, &hour, "mp3");

    if !path.exists() {
        return Err(ApiError::from(Error::not_found_for_hour(
            &stream,
            hour.hour_form(),
        )));
    }

    match ServeFile::new(&path).try_call(req).await {
        Ok(mut response) => {
            response.headers_mut().insert(
                axum::http::header::CONTENT_DISPOSITION,
                axum::http::HeaderValue::from_str(&format!(
                    "attachment; filename=\"{}-{}.mp3\"",
                    stream,
                    hour.hour_form()
                ))
                .unwrap_or_else(|_| axum::http::HeaderValue::from_static("attachment")),
            );
            Ok(response.into_response())
        }
        Err(e) => Err(ApiError::internal(format!("failed to serve file: {e}"))),
    }
}

async fn get_recording_metadata(
    State(state): State<AppState>,
    Path((stream, hour)): Path<(String, String)>,
) -> ApiResult<Response> {
    descriptor_for(&state, &stream)?;
    let hour = time::parse_hour(&hour, state.config.timezone())?;
    let root = state.config.recordings_dir();
    let meta_path = time::metadata_path(&root, &stream, &hour);

    let metadata = tokio::fs::read_to_string(&meta_path)
        .await
        .map_err(|_| ApiError::from(Error::not_found_for_hour(&stream, hour.hour_form())))?;
    let fetched_at = tokio::fs::metadata(&meta_path)
        .await
        .and_then(|m| m.modified())
        .map(chrono::DateTime::<chrono::Utc>::from)
        .unwrap_or_else(|_| chrono::Utc::now());

    Ok(axum::Json(ApiEnvelope::ok(MetadataResponse { metadata, fetched_at })).into_response())
}
