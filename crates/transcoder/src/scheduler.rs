use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use crate::job::{ExportTask, TaskError, TranscodeJob};
use crate::{TranscoderConfig, progress};

/// Runs a job's export tasks under the batch-admission policy: up to W
/// tasks launch in list order, then the whole batch drains before the next
/// batch is admitted. A fast task cannot free its slot early; the barrier
/// between batches is strict.
pub struct Scheduler {
    config: Arc<TranscoderConfig>,
}

impl Scheduler {
    pub fn new(config: TranscoderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Launch every task in the job. Returns immediately; the handle
    /// resolves once all tasks have finished or failed. Task failures are
    /// recorded on the tasks themselves and never abort siblings.
    pub fn start(&self, job: &TranscodeJob) -> JoinHandle<()> {
        let config = self.config.clone();
        let source = job.source().to_path_buf();
        let tasks = job.tasks().to_vec();
        let workers = job.effective_workers(config.default_workers);
        info!(
            source = %source.display(),
            tasks = tasks.len(),
            workers,
            "scheduling transcode job"
        );
        tokio::spawn(run_batches(config, source, tasks, workers))
    }
}

async fn run_batches(
    config: Arc<TranscoderConfig>,
    source: std::path::PathBuf,
    tasks: Vec<Arc<ExportTask>>,
    workers: usize,
) {
    let mut in_flight = JoinSet::new();
    let mut admitted = 0usize;
    for task in tasks {
        let config = config.clone();
        let source = source.clone();
        in_flight.spawn(async move { run_task(&config, &source, task).await });
        admitted += 1;
        if admitted >= workers {
            // Batch barrier: drain every in-flight task before admitting more.
            while in_flight.join_next().await.is_some() {}
            admitted = 0;
        }
    }
    while in_flight.join_next().await.is_some() {}
}

/// Run one export: spawn ffmpeg, follow its stderr for progress, wait for
/// exit. The subprocess and its stderr handle belong to this task alone.
async fn run_task(config: &TranscoderConfig, source: &Path, task: Arc<ExportTask>) {
    let args = build_args(source, &task);
    let mut child = match Command::new(&config.ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(dest = %task.dest_path().display(), error = %e, "ffmpeg spawn failed");
            task.fail(TaskError::Spawn(e));
            return;
        }
    };

    let reader = child.stderr.take().map(|stderr| {
        let task = task.clone();
        let warmup = config.warmup_chunks;
        tokio::spawn(async move { progress::follow(stderr, task, warmup).await })
    });

    match child.wait().await {
        Ok(status) if status.success() => {
            // Let the reader drain to EOF before sealing the task.
            if let Some(handle) = reader {
                let _ = handle.await;
            }
            task.mark_done();
            info!(
                dest = %task.dest_path().display(),
                label = task.rendition().label,
                "export finished"
            );
        }
        Ok(status) => {
            warn!(
                dest = %task.dest_path().display(),
                %status,
                "ffmpeg exited with failure"
            );
            task.fail(TaskError::Exited(status));
        }
        Err(e) => {
            warn!(dest = %task.dest_path().display(), error = %e, "ffmpeg wait failed");
            task.fail(TaskError::Wait(e));
        }
    }
}

/// ffmpeg argv for one rendition. Argument order is load-bearing: maxrate
/// and bufsize share the entry's buffer rate, and the destination comes
/// last.
fn build_args(source: &Path, task: &ExportTask) -> Vec<String> {
    let spec = task.rendition();
    vec![
        "-y".into(),
        "-i".into(),
        source.to_string_lossy().into_owned(),
        "-vf".into(),
        format!("scale={}:{}", spec.width, spec.height),
        "-codec:v".into(),
        "libx264".into(),
        "-preset".into(),
        "slow".into(),
        "-b:v".into(),
        spec.video_bitrate.into(),
        "-b:a".into(),
        spec.audio_bitrate.into(),
        "-maxrate".into(),
        spec.buffer_rate.into(),
        "-bufsize".into(),
        spec.buffer_rate.into(),
        "-profile:v".into(),
        spec.profile.into(),
        task.dest_path().to_string_lossy().into_owned(),
    ]
}
