//! Metadata fetch (external collaborator): best-effort sidecar for each
//! hourly recording, fetched in parallel with the recording itself.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::config::StreamConfig;
use crate::time::{self, Hour};

const FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Fetch and write the `.meta` sidecar for `(stream, hour)`, if configured.
///
/// Entirely best-effort: a missing `metadata_url`, a failed request, or an
/// unparseable body all just skip the write. Metadata is never required for
/// a recording to be considered complete.
pub async fn fetch(stream: &str, config: &StreamConfig, recordings_root: &Path, hour: Hour) {
    let Some(url) = &config.metadata_url else {
        return;
    };

    let body = match fetch_body(url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(stream, url, error = %e, "metadata fetch failed");
            return;
        }
    };

    let content = if config.parse_metadata {
        match extract_field(&body, config.metadata_path.as_deref()) {
            Some(value) => value,
            None => {
                warn!(stream, "metadata_path did not resolve, skipping sidecar");
                return;
            }
        }
    } else {
        body
    };

    let path = time::metadata_path(recordings_root, stream, &hour);
    if let Err(e) = tokio::fs::write(&path, content).await {
        warn!(stream, path = %path.display(), error = %e, "failed to write metadata sidecar");
    }
}

async fn fetch_body(url: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }
    response.text().await.map_err(|e| e.to_string())
}

/// Resolve a dot-separated `path` (e.g. `"now.title"`) against a JSON body.
/// Returns `None` if the body isn't JSON, or the path doesn't resolve.
fn extract_field(body: &str, path: Option<&str>) -> Option<String> {
    let path = path?;
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let mut cursor = &value;
    for segment in path.split('.') {
        cursor = cursor.get(segment)?;
    }
    match cursor {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_string_field() {
        let body = r#"{"now":{"title":"Evening Show"}}"#;
        assert_eq!(
            extract_field(body, Some("now.title")),
            Some("Evening Show".to_string())
        );
    }

    #[test]
    fn missing_path_returns_none() {
        let body = r#"{"now":{"title":"Evening Show"}}"#;
        assert_eq!(extract_field(body, Some("now.artist")), None);
    }

    #[test]
    fn non_json_body_returns_none() {
        assert_eq!(extract_field("not json", Some("now.title")), None);
    }

    #[test]
    fn no_path_configured_returns_none() {
        let body = r#"{"now":{"title":"Evening Show"}}"#;
        assert_eq!(extract_field(body, None), None);
    }

    #[test]
    fn non_string_leaf_is_stringified() {
        let body = r#"{"listeners":42}"#;
        assert_eq!(extract_field(body, Some("listeners")), Some("42".to_string()));
    }
}
