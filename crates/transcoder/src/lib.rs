#![allow(clippy::collapsible_if)]
pub mod ffprobe;
pub mod job;
pub mod progress;
pub mod scheduler;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors fatal to job construction. Per-task runtime failures are recorded
/// on the task itself as [`job::TaskError`] and never surface here.
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),
    #[error("unknown rendition: {0}")]
    UnknownRendition(String),
    #[error("bad source path: {0}")]
    BadSourcePath(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Knobs for the transcode core. The daemon fills these from env vars;
/// tests point the binary paths at stubs.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Worker count used when a job asks for fewer than 1.
    pub default_workers: usize,
    /// Stderr chunks discarded before the first progress parse. ffmpeg's
    /// early output carries no usable timestamps.
    pub warmup_chunks: u32,
    /// How often the aggregator samples task progress.
    pub poll_interval: Duration,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            default_workers: 2,
            warmup_chunks: 50,
            poll_interval: Duration::from_secs(1),
        }
    }
}
