use std::path::Path;

use serde::Deserialize;

use renditor_core::types::Resolution;

use crate::TranscodeError;

/// What the job needs to know about a source file before building tasks.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub resolution: Resolution,
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    #[serde(default)]
    streams: Vec<RawStream>,
    format: RawFormat,
}

// `-show_entries stream=width,height` still emits one object per stream;
// audio streams come back empty.
#[derive(Debug, Deserialize)]
struct RawStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Run ffprobe on a file and parse its JSON output.
///
/// Any failure here aborts job creation: spawn error, non-zero exit, bad
/// JSON, or a file with no video stream.
pub async fn probe(ffprobe_path: &Path, file: &Path) -> Result<MediaInfo, TranscodeError> {
    let output = tokio::process::Command::new(ffprobe_path)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_entries",
            "stream=width,height",
        ])
        .arg(file)
        .output()
        .await
        .map_err(|e| TranscodeError::ProbeFailed(format!("spawn failed: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscodeError::ProbeFailed(stderr.into_owned()));
    }

    let raw: RawProbe = serde_json::from_slice(&output.stdout)
        .map_err(|e| TranscodeError::ProbeFailed(format!("parse JSON: {e}")))?;

    parse_probe(raw)
}

fn parse_probe(raw: RawProbe) -> Result<MediaInfo, TranscodeError> {
    let resolution = raw
        .streams
        .iter()
        .find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) => Some(Resolution::new(w, h)),
            _ => None,
        })
        .ok_or_else(|| TranscodeError::ProbeFailed("no video stream".into()))?;

    let duration_secs: f64 = raw
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);

    let size_bytes: u64 = raw
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(MediaInfo {
        duration_secs,
        size_bytes,
        resolution,
    })
}
