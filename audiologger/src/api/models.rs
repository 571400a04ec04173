//! JSON response types shared by every route.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Standard JSON envelope wrapping every API response.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub meta: EnvelopeMeta,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeMeta {
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl EnvelopeMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            count: None,
        }
    }
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: EnvelopeMeta::now(),
        }
    }

    pub fn ok_list(data: T, count: usize) -> Self {
        let mut meta = EnvelopeMeta::now();
        meta.count = Some(count);
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta,
        }
    }
}

impl ApiEnvelope<()> {
    pub fn err(code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(EnvelopeError {
                code,
                message: message.into(),
            }),
            meta: EnvelopeMeta::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: Vec<ReadinessCheck>,
}

#[derive(Debug, Serialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub stream_url: String,
    pub record_duration_secs: u64,
    pub keep_days: u32,
    pub has_metadata_source: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordingDescriptor {
    pub hour: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct RecordingInfo {
    pub stream: String,
    pub hour: String,
    pub size_bytes: u64,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub metadata: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatsResponse {
    pub streams: std::collections::HashMap<String, crate::recorder::StreamStats>,
    pub cache: crate::cache::CacheStats,
}
