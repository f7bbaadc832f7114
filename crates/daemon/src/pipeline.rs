//! One detected file, end to end: probe, build the job, run the scheduler,
//! follow aggregate progress, then relocate outputs and write manifests.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use renditor_core::ladder;
use renditor_transcoder::job::{JobReport, TranscodeJob};
use renditor_transcoder::progress;
use renditor_transcoder::scheduler::Scheduler;

use crate::config::Config;
use crate::manifest::{self, Manifest};
use crate::watch;

/// Entry point for a settled path from the watcher. Failures are logged,
/// never fatal to the daemon loop.
pub async fn handle_new_video(config: &Config, path: &Path) {
    if !watch::is_source_video(path) {
        return;
    }
    if let Err(e) = process(config, path).await {
        warn!(path = %path.display(), error = %e, "conversion pipeline failed");
    }
}

async fn process(config: &Config, path: &Path) -> anyhow::Result<()> {
    let mut job = TranscodeJob::create(
        &config.transcoder,
        path,
        &config.work_dir,
        &ladder::all_labels(),
    )
    .await
    .context("job construction")?;
    job.set_workers(config.workers);

    if job.tasks().is_empty() {
        info!(path = %path.display(), "source below lowest rendition, nothing to export");
    }

    let scheduler = Scheduler::new(config.transcoder.clone());
    let running = scheduler.start(&job);

    let mut rx = progress::watch(&job, config.transcoder.poll_interval);
    while let Some(pct) = rx.recv().await {
        info!(source = %path.display(), progress = pct, "transcoding");
    }
    running.await.context("scheduler task panicked")?;

    let report = job.report();
    for export in report.exports.iter().filter(|e| e.error.is_some()) {
        warn!(
            dest = %export.dest.display(),
            label = %export.label,
            error = export.error.as_deref().unwrap_or(""),
            "export failed"
        );
    }

    let (dest_dir, relocated_source) = relocate(&config.export_dir, &report).await?;

    let manifest = Manifest::from_report(&report, &relocated_source)?;
    manifest::write_json(&dest_dir, &manifest).await?;
    manifest::write_smil(&dest_dir, &manifest.video_id, &report).await?;

    info!(dir = %dest_dir.display(), "video published");
    Ok(())
}

/// Move the source and every completed rendition into
/// `export_dir/<stem>/`. Returns the directory and the source's new path.
pub(crate) async fn relocate(
    export_dir: &Path,
    report: &JobReport,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let stem = report
        .source
        .file_stem()
        .and_then(|s| s.to_str())
        .context("source file has no stem")?;
    let file_name = report
        .source
        .file_name()
        .context("source file has no name")?;

    let dest_dir = export_dir.join(stem);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .with_context(|| format!("create {}", dest_dir.display()))?;

    let relocated_source = dest_dir.join(file_name);
    move_file(&report.source, &relocated_source).await?;

    for export in report.exports.iter().filter(|e| e.done) {
        let name = export.dest.file_name().context("export has no file name")?;
        move_file(&export.dest, &dest_dir.join(name)).await?;
    }

    Ok((dest_dir, relocated_source))
}

/// Rename with a copy-and-remove fallback for cross-device moves.
async fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
    tokio::fs::remove_file(from)
        .await
        .with_context(|| format!("remove {}", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use renditor_transcoder::job::ExportReport;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("renditord_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn move_file_works_within_a_directory() {
        let dir = test_dir("move");
        let from = dir.join("a.mp4");
        let to = dir.join("b.mp4");
        tokio::fs::write(&from, b"data").await.unwrap();

        move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"data");
    }

    #[tokio::test]
    async fn relocate_moves_source_and_completed_exports() {
        let dir = test_dir("relocate");
        let incoming = dir.join("incoming");
        let work = dir.join("work");
        let exports = dir.join("exports");
        std::fs::create_dir_all(&incoming).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        let source = incoming.join("clip.mp4");
        std::fs::write(&source, b"src").unwrap();
        let done_dest = work.join("clip_720.mp4");
        std::fs::write(&done_dest, b"720").unwrap();
        let failed_dest = work.join("clip_240.mp4");

        let report = JobReport {
            source: source.clone(),
            duration_secs: 10.0,
            size_bytes: 3,
            exports: vec![
                ExportReport {
                    dest: done_dest.clone(),
                    label: "720p".into(),
                    width: 1280,
                    height: 720,
                    video_bitrate: "2500k".into(),
                    done: true,
                    error: None,
                },
                ExportReport {
                    dest: failed_dest,
                    label: "240p".into(),
                    width: 426,
                    height: 240,
                    video_bitrate: "400k".into(),
                    done: false,
                    error: Some("exit 1".into()),
                },
            ],
        };

        let (dest_dir, relocated) = relocate(&exports, &report).await.unwrap();
        assert_eq!(dest_dir, exports.join("clip"));
        assert_eq!(relocated, dest_dir.join("clip.mp4"));
        assert!(relocated.exists());
        assert!(dest_dir.join("clip_720.mp4").exists());
        assert!(!source.exists());
        assert!(!done_dest.exists());
        // The failed rendition is left alone.
        assert!(!dest_dir.join("clip_240.mp4").exists());
    }
}
