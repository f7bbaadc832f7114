//! Directory watcher feeding the conversion pipeline.
//!
//! Create/modify events land in a settle map; a path is only forwarded once
//! it has stayed quiet for the configured settle time, so half-written
//! uploads never reach ffprobe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Only plain mp4 uploads enter the pipeline.
pub fn is_source_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
}

/// Watch `dir` and forward settled video paths until cancelled.
pub async fn run(
    dir: PathBuf,
    settle_time: Duration,
    tx: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let pending: Arc<Mutex<HashMap<PathBuf, Instant>>> = Arc::new(Mutex::new(HashMap::new()));
    let pending_events = pending.clone();

    let mut watcher: RecommendedWatcher = notify::recommended_watcher(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    if let Ok(mut map) = pending_events.lock() {
                        for path in event.paths {
                            map.insert(path, Instant::now());
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "watch event error"),
        },
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(path = %dir.display(), "watching for new videos");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = cancel.cancelled() => break,
        }

        let now = Instant::now();
        let mut settled = Vec::new();
        if let Ok(mut map) = pending.lock() {
            map.retain(|path, last_seen| {
                if now.duration_since(*last_seen) >= settle_time {
                    settled.push(path.clone());
                    false
                } else {
                    true
                }
            });
        }

        for path in settled {
            if !is_source_video(&path) {
                continue;
            }
            info!(path = %path.display(), "new file detected");
            if tx.send(path).await.is_err() {
                // Pipeline side went away; nothing left to feed.
                break;
            }
        }
    }

    info!("watcher stopped");
    drop(watcher);
    Ok(())
}
