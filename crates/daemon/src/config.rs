use std::path::PathBuf;
use std::time::Duration;

use renditor_transcoder::TranscoderConfig;

/// Daemon configuration, filled from `RENDITOR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory watched for newly arrived sources.
    pub watch_dir: PathBuf,
    /// Where renditions are written while a job runs.
    pub work_dir: PathBuf,
    /// Final home for the source, its renditions and manifests.
    pub export_dir: PathBuf,
    /// Concurrency limit handed to each job.
    pub workers: usize,
    /// How long a file must stay quiet before it counts as fully written.
    pub settle_time: Duration,
    pub transcoder: TranscoderConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let workers = std::env::var("RENDITOR_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(2)
            });

        let settle_secs: u64 = std::env::var("RENDITOR_SETTLE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);

        let mut transcoder = TranscoderConfig::default();
        if let Ok(p) = std::env::var("RENDITOR_FFMPEG") {
            transcoder.ffmpeg_path = p.into();
        }
        if let Ok(p) = std::env::var("RENDITOR_FFPROBE") {
            transcoder.ffprobe_path = p.into();
        }

        Self {
            watch_dir: env_path("RENDITOR_WATCH_DIR", "./incoming"),
            work_dir: env_path("RENDITOR_WORK_DIR", "./work"),
            export_dir: env_path("RENDITOR_EXPORT_DIR", "./exports"),
            workers,
            settle_time: Duration::from_secs(settle_secs),
            transcoder,
        }
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).unwrap_or_else(|_| default.to_string()).into()
}
