use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use renditor_core::ladder::{self, OUTPUT_EXT, RenditionSpec};
use renditor_core::types::Resolution;

use crate::ffprobe::{self, MediaInfo};
use crate::{TranscodeError, TranscoderConfig};

/// Failures recorded on an individual export task. These never abort the
/// job or its sibling tasks; callers inspect them after the scheduler
/// finishes.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("ffmpeg spawn failed: {0}")]
    Spawn(std::io::Error),
    #[error("ffmpeg exited with {0}")]
    Exited(std::process::ExitStatus),
    #[error("ffmpeg wait failed: {0}")]
    Wait(std::io::Error),
}

/// One source-to-rendition conversion unit and its runtime state.
///
/// Progress is written by the task's stderr reader and read by aggregator
/// pollers; done/error are written once by the task's own execution unit.
/// Each field gets its own primitive instead of a coarse task lock.
#[derive(Debug)]
pub struct ExportTask {
    spec: &'static RenditionSpec,
    dest: PathBuf,
    source_duration_secs: f64,
    progress_bits: AtomicU32,
    done: AtomicBool,
    error: OnceLock<TaskError>,
}

impl ExportTask {
    fn new(spec: &'static RenditionSpec, dest: PathBuf, source_duration_secs: f64) -> Self {
        Self {
            spec,
            dest,
            source_duration_secs,
            progress_bits: AtomicU32::new(0f32.to_bits()),
            done: AtomicBool::new(false),
            error: OnceLock::new(),
        }
    }

    pub fn rendition(&self) -> &'static RenditionSpec {
        self.spec
    }

    pub fn resolution(&self) -> Resolution {
        self.spec.resolution()
    }

    pub fn dest_path(&self) -> &Path {
        &self.dest
    }

    pub fn source_duration_secs(&self) -> f64 {
        self.source_duration_secs
    }

    /// Latest parsed progress, 0–100.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_progress(&self, pct: f32) {
        self.progress_bits.store(pct.to_bits(), Ordering::Relaxed);
    }

    /// Clean completion. Progress is forced to 100 so the aggregate always
    /// terminates even when the last stderr chunk carried no timestamp.
    pub(crate) fn mark_done(&self) {
        self.set_progress(100.0);
        self.done.store(true, Ordering::Release);
    }

    /// Record a failure. First error wins; the task stays failed.
    pub(crate) fn fail(&self, err: TaskError) {
        let _ = self.error.set(err);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.get()
    }
}

/// The set of export tasks derived from one source file.
///
/// Tasks are fixed once construction succeeds; the scheduler only borrows
/// them while running.
#[derive(Debug)]
pub struct TranscodeJob {
    source: PathBuf,
    out_dir: PathBuf,
    media: MediaInfo,
    tasks: Vec<Arc<ExportTask>>,
    workers: usize,
}

impl TranscodeJob {
    /// Probe the source, then build the task list. Probe failure aborts
    /// construction; no partial job is returned.
    pub async fn create(
        config: &TranscoderConfig,
        source: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        labels: &[&str],
    ) -> Result<Self, TranscodeError> {
        let source = source.into();
        let media = ffprobe::probe(&config.ffprobe_path, &source).await?;
        Self::from_media(media, source, out_dir.into(), labels)
    }

    /// Build the task list from already-probed metadata.
    ///
    /// Renditions that would upscale the source are silently skipped, so the
    /// task list may be shorter than `labels` — never longer.
    pub fn from_media(
        media: MediaInfo,
        source: PathBuf,
        out_dir: PathBuf,
        labels: &[&str],
    ) -> Result<Self, TranscodeError> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| TranscodeError::BadSourcePath(source.clone()))?;

        let mut tasks = Vec::new();
        for label in labels {
            let spec = ladder::lookup(label)
                .ok_or_else(|| TranscodeError::UnknownRendition(label.to_string()))?;

            if !spec.resolution().fits_within(&media.resolution) {
                debug!(
                    label,
                    source_res = %media.resolution,
                    "skipping rendition above source resolution"
                );
                continue;
            }

            let dest = out_dir.join(format!("{stem}{}{}", spec.suffix, OUTPUT_EXT));
            tasks.push(Arc::new(ExportTask::new(spec, dest, media.duration_secs)));
        }

        Ok(Self {
            source,
            out_dir,
            media,
            tasks,
            workers: 0,
        })
    }

    /// Override the concurrency limit. Values below 1 fall back to the
    /// configured default at schedule time.
    pub fn set_workers(&mut self, n: usize) {
        self.workers = n;
    }

    pub(crate) fn effective_workers(&self, default: usize) -> usize {
        if self.workers < 1 { default } else { self.workers }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn media(&self) -> &MediaInfo {
        &self.media
    }

    pub fn tasks(&self) -> &[Arc<ExportTask>] {
        &self.tasks
    }

    /// Snapshot of the job for manifest writing and logging.
    pub fn report(&self) -> JobReport {
        JobReport {
            source: self.source.clone(),
            duration_secs: self.media.duration_secs,
            size_bytes: self.media.size_bytes,
            exports: self
                .tasks
                .iter()
                .map(|t| ExportReport {
                    dest: t.dest.clone(),
                    label: t.spec.label.to_string(),
                    width: t.spec.width,
                    height: t.spec.height,
                    video_bitrate: t.spec.video_bitrate.to_string(),
                    done: t.is_done(),
                    error: t.error().map(|e| e.to_string()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub source: PathBuf,
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub exports: Vec<ExportReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub dest: PathBuf,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub video_bitrate: String,
    pub done: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(width: u32, height: u32, duration_secs: f64) -> MediaInfo {
        MediaInfo {
            duration_secs,
            size_bytes: 10_000_000,
            resolution: Resolution::new(width, height),
        }
    }

    fn build(media: MediaInfo, labels: &[&str]) -> Result<TranscodeJob, TranscodeError> {
        TranscodeJob::from_media(
            media,
            PathBuf::from("/in/clip.mp4"),
            PathBuf::from("/work"),
            labels,
        )
    }

    #[test]
    fn full_ladder_for_1080p_source() {
        let job = build(media(1920, 1080, 120.0), &["1080p", "720p", "240p"]).unwrap();
        assert_eq!(job.tasks().len(), 3);
        assert_eq!(
            job.tasks()[0].dest_path(),
            Path::new("/work/clip_1080.mp4")
        );
        assert_eq!(job.tasks()[2].dest_path(), Path::new("/work/clip_240.mp4"));
    }

    #[test]
    fn upscale_guard_skips_silently() {
        let job = build(media(1280, 720, 60.0), &["1080p", "720p", "360p"]).unwrap();
        let labels: Vec<_> = job.tasks().iter().map(|t| t.rendition().label).collect();
        assert_eq!(labels, ["720p", "360p"]);
    }

    #[test]
    fn guard_checks_both_axes() {
        // Tall enough for 720p but not wide enough.
        let job = build(media(1000, 720, 60.0), &["720p", "360p"]).unwrap();
        let labels: Vec<_> = job.tasks().iter().map(|t| t.rendition().label).collect();
        assert_eq!(labels, ["360p"]);
    }

    #[test]
    fn all_labels_above_native_yields_empty_job() {
        let job = build(media(426, 240, 60.0), &["1080p", "720p", "480p"]).unwrap();
        assert!(job.tasks().is_empty());
    }

    #[test]
    fn unknown_label_is_fatal() {
        let err = build(media(1920, 1080, 60.0), &["1080p", "4k"]).unwrap_err();
        assert!(matches!(err, TranscodeError::UnknownRendition(l) if l == "4k"));
    }

    #[test]
    fn tasks_carry_source_duration() {
        let job = build(media(1920, 1080, 321.5), &["480p"]).unwrap();
        assert_eq!(job.tasks()[0].source_duration_secs(), 321.5);
    }

    #[test]
    fn worker_floor_falls_back_to_default() {
        let mut job = build(media(1920, 1080, 60.0), &["480p"]).unwrap();
        assert_eq!(job.effective_workers(2), 2);
        job.set_workers(0);
        assert_eq!(job.effective_workers(2), 2);
        job.set_workers(5);
        assert_eq!(job.effective_workers(2), 5);
    }

    #[test]
    fn task_state_transitions() {
        let job = build(media(1920, 1080, 60.0), &["480p"]).unwrap();
        let task = &job.tasks()[0];
        assert!(!task.is_done());
        assert!(task.error().is_none());
        assert_eq!(task.progress(), 0.0);

        task.set_progress(42.5);
        assert_eq!(task.progress(), 42.5);

        task.mark_done();
        assert!(task.is_done());
        assert_eq!(task.progress(), 100.0);
    }

    #[test]
    fn first_task_error_wins() {
        let job = build(media(1920, 1080, 60.0), &["480p"]).unwrap();
        let task = &job.tasks()[0];
        task.fail(TaskError::Spawn(std::io::Error::other("no ffmpeg")));
        task.fail(TaskError::Wait(std::io::Error::other("later")));
        assert!(matches!(task.error(), Some(TaskError::Spawn(_))));
    }

    #[test]
    fn report_reflects_task_state() {
        let job = build(media(1920, 1080, 60.0), &["720p", "240p"]).unwrap();
        job.tasks()[0].mark_done();
        job.tasks()[1].fail(TaskError::Spawn(std::io::Error::other("boom")));

        let report = job.report();
        assert_eq!(report.exports.len(), 2);
        assert!(report.exports[0].done);
        assert!(report.exports[0].error.is_none());
        assert!(!report.exports[1].done);
        assert!(report.exports[1].error.as_deref().unwrap().contains("boom"));
    }
}
