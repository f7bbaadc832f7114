//! Per-video delivery descriptors: a JSON manifest for the catalogue and a
//! SMIL playlist for the streaming edge. Both are rendered from a job
//! report after relocation, listing only renditions that completed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use renditor_transcoder::job::JobReport;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub video_id: String,
    pub fullpath: PathBuf,
    pub duration: f64,
    pub size: u64,
    /// Heights of the renditions that completed, ladder order.
    pub qualities: Vec<u32>,
}

impl Manifest {
    pub fn from_report(report: &JobReport, relocated_source: &Path) -> anyhow::Result<Self> {
        let video_id = relocated_source
            .file_stem()
            .and_then(|s| s.to_str())
            .context("source file has no stem")?
            .to_string();

        Ok(Self {
            video_id,
            fullpath: relocated_source.to_path_buf(),
            duration: report.duration_secs,
            size: report.size_bytes,
            qualities: report
                .exports
                .iter()
                .filter(|e| e.done)
                .map(|e| e.height)
                .collect(),
        })
    }
}

/// Write `<stem>.json` next to the relocated video.
pub async fn write_json(dir: &Path, manifest: &Manifest) -> anyhow::Result<()> {
    let path = dir.join(format!("{}.json", manifest.video_id));
    let data = serde_json::to_vec_pretty(manifest)?;
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("write manifest {}", path.display()))?;
    Ok(())
}

/// Write `<stem>.smil` next to the relocated video.
pub async fn write_smil(dir: &Path, stem: &str, report: &JobReport) -> anyhow::Result<()> {
    let path = dir.join(format!("{stem}.smil"));
    tokio::fs::write(&path, render_smil(report))
        .await
        .with_context(|| format!("write playlist {}", path.display()))?;
    Ok(())
}

/// Render the SMIL switch body from completed exports.
pub fn render_smil(report: &JobReport) -> String {
    let mut out = String::from("<smil>\n<head>\n</head>\n<body>\n<switch>\n");
    for export in report.exports.iter().filter(|e| e.done) {
        let src = export
            .dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push_str(&format!(
            "<video src=\"{src}\" system-bitrate=\"{}\"/>\n",
            bitrate_bps(&export.video_bitrate)
        ));
    }
    out.push_str("</switch>\n</body>\n</smil>\n");
    out
}

/// `"4500k"` → 4_500_000. Values without a suffix are taken as plain bps.
fn bitrate_bps(rate: &str) -> u64 {
    match rate.strip_suffix('k') {
        Some(n) => n.parse::<u64>().unwrap_or(0) * 1000,
        None => rate.parse().unwrap_or(0),
    }
}
