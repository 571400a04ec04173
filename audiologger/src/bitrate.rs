//! Bitrate detector (C3).
//!
//! Detects a stream's bitrate, in order, short-circuiting on first success:
//! `icy-br` header, `ice-audio-info` header, MP3 frame sync scan of the
//! first 4 KiB of body, falling back to 128 kbps with a warning.

use std::time::Duration;

use tracing::warn;

/// Total time budget for the detection request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

/// Bytes of response body scanned for an MP3 frame sync when headers don't
/// carry a bitrate.
const SCAN_BYTES: usize = 4096;

/// Fallback bitrate used when every upstream signal is absent.
pub const FALLBACK_BITRATE_KBPS: u32 = 128;

/// MPEG-1 Layer III bitrate table, indexed by the 4-bit bitrate index found
/// in MP3 frame headers. Indices 0 and 15 are invalid ("free"/reserved).
const MPEG1_LAYER3_BITRATES: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];

/// Detect a stream's bitrate in kbps. Never fails: falls back to
/// [`FALLBACK_BITRATE_KBPS`] and logs a warning on complete failure.
pub async fn detect(client: &reqwest::Client, stream_url: &str) -> u32 {
    match try_detect(client, stream_url).await {
        Ok(kbps) => kbps,
        Err(reason) => {
            warn!(stream_url, reason, "bitrate detection failed, falling back to 128 kbps");
            FALLBACK_BITRATE_KBPS
        }
    }
}

async fn try_detect(client: &reqwest::Client, stream_url: &str) -> Result<u32, String> {
    let response = tokio::time::timeout(
        PROBE_TIMEOUT,
        client
            .get(stream_url)
            .header("Icy-MetaData", "1")
            .send(),
    )
    .await
    .map_err(|_| "probe request timed out".to_string())?
    .map_err(|e| format!("probe request failed: {e}"))?;

    if response.status().as_u16() >= 400 {
        return Err(format!("probe returned status {}", response.status()));
    }

    if let Some(kbps) = response
        .headers()
        .get("icy-br")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        return Ok(kbps);
    }

    if let Some(kbps) = response
        .headers()
        .get("ice-audio-info")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bitrate_from_ice_audio_info)
    {
        return Ok(kbps);
    }

    let mut body = response.bytes_stream();
    let mut buf = Vec::with_capacity(SCAN_BYTES);
    use futures::StreamExt;
    while buf.len() < SCAN_BYTES {
        match tokio::time::timeout(PROBE_TIMEOUT, body.next()).await {
            Ok(Some(Ok(chunk))) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }

    scan_mp3_frame_sync(&buf).ok_or_else(|| "no bitrate signal found in headers or body".to_string())
}

/// Parse `bitrate=<n>` out of an `ice-audio-info` header value, e.g.
/// `"ice-samplerate=44100;ice-bitrate=128;ice-channels=2"`.
fn parse_bitrate_from_ice_audio_info(value: &str) -> Option<u32> {
    value.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("bitrate=")
            .or_else(|| part.strip_prefix("ice-bitrate="))
            .and_then(|n| n.parse::<u32>().ok())
    })
}

/// Scan `buf` for an MP3 frame sync (`0xFF` followed by a byte whose top
/// three bits are `111`) and return the bitrate looked up from the frame's
/// bitrate index.
fn scan_mp3_frame_sync(buf: &[u8]) -> Option<u32> {
    for window in buf.windows(4) {
        if window[0] == 0xFF && (window[1] & 0xE0) == 0xE0 {
            let bitrate_index = (window[2] >> 4) & 0x0F;
            if bitrate_index == 0 || bitrate_index == 15 {
                continue;
            }
            let kbps = MPEG1_LAYER3_BITRATES[bitrate_index as usize];
            if kbps > 0 {
                return Some(kbps);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ice_audio_info_bitrate() {
        assert_eq!(
            parse_bitrate_from_ice_audio_info("ice-samplerate=44100;bitrate=160;ice-channels=2"),
            Some(160)
        );
        assert_eq!(
            parse_bitrate_from_ice_audio_info("ice-samplerate=44100;ice-bitrate=96"),
            Some(96)
        );
        assert_eq!(parse_bitrate_from_ice_audio_info("no-bitrate-here"), None);
    }

    #[test]
    fn frame_sync_table_covers_all_valid_indices() {
        let cases: [(u8, u32); 14] = [
            (1, 32),
            (2, 40),
            (3, 48),
            (4, 56),
            (5, 64),
            (6, 80),
            (7, 96),
            (8, 112),
            (9, 128),
            (10, 160),
            (11, 192),
            (12, 224),
            (13, 256),
            (14, 320),
        ];
        for (index, expected) in cases {
            // byte2 top 3 bits = sync, byte3 top 4 bits = bitrate index
            let frame = [0xFF, 0xFB, index << 4, 0x00];
            assert_eq!(scan_mp3_frame_sync(&frame), Some(expected), "index {index}");
        }
    }

    #[test]
    fn frame_sync_rejects_invalid_indices() {
        assert_eq!(scan_mp3_frame_sync(&[0xFF, 0xFB, 0x00, 0x00]), None); // index 0
        assert_eq!(scan_mp3_frame_sync(&[0xFF, 0xFB, 0xF0, 0x00]), None); // index 15
    }

    #[test]
    fn frame_sync_skips_non_sync_bytes() {
        let buf = [0x00, 0x11, 0x22, 0xFF, 0xFB, 9 << 4, 0x00];
        assert_eq!(scan_mp3_frame_sync(&buf), Some(128));
    }

    #[test]
    fn frame_sync_requires_top_three_bits_set() {
        // 0xFF followed by a byte with only the top bit set should not match.
        let buf = [0xFF, 0x80, 9 << 4, 0x00];
        assert_eq!(scan_mp3_frame_sync(&buf), None);
    }
}
