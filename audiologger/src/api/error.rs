//! API error handling: maps the core [`crate::error::Error`] to HTTP status
//! codes and the shared JSON envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::api::models::ApiEnvelope;
use crate::error::Error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiEnvelope::<()>::err(self.status.as_u16(), self.message);
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFoundForHour { stream, hour } => {
                ApiError::not_found(format!("no recording for stream '{stream}' at hour '{hour}'"))
            }
            Error::UnknownStream(name) => ApiError::not_found(format!("unknown stream '{name}'")),
            Error::MalformedRequest(msg) => ApiError::bad_request(msg),
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::ExtractionFailed(msg) => {
                tracing::error!(error = %msg, "extraction failed");
                ApiError::internal("extraction failed")
            }
            Error::Disk(msg) => {
                tracing::error!(error = %msg, "disk error");
                ApiError::internal("disk error")
            }
            other => {
                tracing::error!(error = %other, "unexpected error");
                ApiError::internal("an unexpected error occurred")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stream_maps_to_404() {
        let err: ApiError = Error::UnknownStream("zw".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_request_maps_to_400() {
        let err: ApiError = Error::MalformedRequest("bad range".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn extraction_failure_maps_to_500() {
        let err: ApiError = Error::ExtractionFailed("ffmpeg exit 1".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
