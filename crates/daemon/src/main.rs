use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use renditor_daemon::{config::Config, pipeline, watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::from_env());
    for dir in [&config.watch_dir, &config.work_dir, &config.export_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
    }
    info!(
        watch = %config.watch_dir.display(),
        work = %config.work_dir.display(),
        exports = %config.export_dir.display(),
        workers = config.workers,
        "renditord starting"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            cancel.cancel();
        });
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<PathBuf>(256);
    let watcher = tokio::spawn(watch::run(
        config.watch_dir.clone(),
        config.settle_time,
        tx,
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(path) => {
                    let config = config.clone();
                    tokio::spawn(async move {
                        pipeline::handle_new_video(&config, &path).await;
                    });
                }
                None => break,
            },
        }
    }

    watcher.await.context("watcher task panicked")??;
    Ok(())
}
