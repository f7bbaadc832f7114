use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::job::{ExportTask, TranscodeJob};

/// Stderr is consumed in chunks of this size.
const CHUNK_SIZE: usize = 1024;

/// Denominator used when the source duration is unknown or zero. A
/// defensive stand-in against division by zero, not an estimate.
const FALLBACK_SOURCE_SECS: f64 = 15.0 * 60.0;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+):(\d+):(\d+)").unwrap());

/// Follow an ffmpeg stderr stream and keep the task's progress current.
///
/// The first `warmup_chunks` chunks are discarded; ffmpeg's banner and
/// stream-mapping output carry no usable timestamps. After that, each chunk
/// is scanned for its last `time=HH:MM:SS` marker; a chunk without one
/// leaves the previous value in place. Returns at end-of-stream.
pub async fn follow<R>(mut stream: R, task: Arc<ExportTask>, warmup_chunks: u32)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut chunks_seen = 0u32;
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        chunks_seen += 1;
        if chunks_seen <= warmup_chunks {
            continue;
        }
        let text = String::from_utf8_lossy(&buf[..n]);
        if let Some(elapsed) = last_timestamp_secs(&text) {
            task.set_progress(percent(elapsed, task.source_duration_secs()));
        }
    }
}

/// Seconds encoded by the last `time=HH:MM:SS` marker in `text`, if any.
fn last_timestamp_secs(text: &str) -> Option<f64> {
    let caps = TIME_RE.captures_iter(text).last()?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn percent(elapsed_secs: f64, source_secs: f64) -> f32 {
    let total = if source_secs > 0.0 {
        source_secs
    } else {
        FALLBACK_SOURCE_SECS
    };
    ((elapsed_secs / total * 100.0) as f32).min(100.0)
}

/// Average progress over tasks with no recorded error, clamped to 100.
/// `None` when no task qualifies (all failed, or the job had nothing to do).
pub fn snapshot(tasks: &[Arc<ExportTask>]) -> Option<f32> {
    let mut sum = 0.0f32;
    let mut counted = 0u32;
    for task in tasks {
        if task.error().is_some() {
            continue;
        }
        counted += 1;
        sum += task.progress();
    }
    if counted == 0 {
        return None;
    }
    Some((sum / counted as f32).min(100.0))
}

/// Job-level progress stream, sampled every `interval`.
///
/// Emits the aggregate once per tick; on reaching 100 the final 100 is sent
/// and the channel closes. Values are polling snapshots, stale by at most
/// one interval. When no task qualifies for aggregation a single 0 is
/// emitted before closing, so consumers always observe at least one value.
pub fn watch(job: &TranscodeJob, interval: Duration) -> mpsc::Receiver<f32> {
    let tasks: Vec<Arc<ExportTask>> = job.tasks().to_vec();
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match snapshot(&tasks) {
                None => {
                    let _ = tx.send(0.0).await;
                    break;
                }
                Some(p) if p >= 100.0 => {
                    let _ = tx.send(100.0).await;
                    break;
                }
                Some(p) => {
                    if tx.send(p).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
