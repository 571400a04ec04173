//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transient stream error: {0}")]
    TransientStream(String),

    #[error("Permanent stream error: {0}")]
    PermanentStream(String),

    #[error("Validation failure: {0}")]
    Validation(String),

    #[error("No recording for stream '{stream}' at hour '{hour}'")]
    NotFoundForHour { stream: String, hour: String },

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Disk error: {0}")]
    Disk(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found_for_hour(stream: impl Into<String>, hour: impl Into<String>) -> Self {
        Self::NotFoundForHour {
            stream: stream.into(),
            hour: hour.into(),
        }
    }
}
