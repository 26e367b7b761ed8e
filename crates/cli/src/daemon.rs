//! Daemon lifecycle
//!
//! Wires the watcher, reconciler, coordinator and completion monitor
//! together and runs them until a shutdown signal. On shutdown the watcher
//! stops delivering events, the monitor stops polling and uploads already
//! running finish before the process exits.

use crate::locks::DaemonLock;
use anyhow::{Context, Result};
use engine::{ChunkUploader, CompletionMonitor, IngestCoordinator, PathLocks};
use journal::CheckpointStore;
use objstore::{ObjectStore, S3Config, S3ObjectStore};
use sd_core::{RetryPolicy, Settings};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use watcher::{DirWatcher, FileChangeHandler, Reconciler, SuffixFilter};

/// Run the ingest service in the foreground until interrupted
pub async fn run(settings: Settings) -> Result<()> {
    let watch_dir = settings
        .watch_dir
        .canonicalize()
        .with_context(|| format!("Watch directory {} is not accessible", settings.watch_dir.display()))?;

    let lock = DaemonLock::acquire(&settings.state_dir)?;

    info!("Starting streamdrop");
    info!("Watch directory: {}", watch_dir.display());
    info!("File suffix: {}", settings.file_suffix);
    info!("Chunk size: {} bytes", settings.chunk_size);
    info!("Stream timeout: {}s", settings.stream_timeout);

    let checkpoints = Arc::new(
        CheckpointStore::open(&settings.redis_url, settings.record_ttl())
            .await
            .context("Failed to set up checkpoint store")?,
    );
    info!("Checkpoint store: {}", checkpoints.describe());

    let s3 = S3ObjectStore::new(S3Config::from_settings(&settings));
    info!("Object store: {} (bucket {})", settings.s3_endpoint, s3.bucket());
    let objects: Arc<dyn ObjectStore> = Arc::new(s3);

    let locks = Arc::new(PathLocks::new());
    let uploader = Arc::new(
        ChunkUploader::new(
            objects.clone(),
            checkpoints.clone(),
            locks.clone(),
            settings.chunk_size,
        )
        .with_retry(RetryPolicy::fixed(
            settings.upload_attempts,
            settings.upload_retry_delay(),
        )),
    );
    let monitor = CompletionMonitor::new(
        checkpoints.clone(),
        objects,
        locks,
        uploader.chunk_size(),
        settings.inactivity_timeout(),
        settings.poll_interval(),
    );

    let filter = SuffixFilter::new(settings.file_suffix.clone());
    let coordinator: Arc<dyn FileChangeHandler> = Arc::new(
        IngestCoordinator::new(uploader, checkpoints, filter.clone())
            .purge_on_delete(settings.purge_on_delete),
    );

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();

    let dir_watcher = DirWatcher::start(&watch_dir, tx.clone())?;
    let reconciler = Reconciler::new(watch_dir, filter, settings.reconcile_interval());

    let reconcile_task = tokio::spawn(reconciler.run(tx, cancel.clone()));
    let dispatch_task = tokio::spawn(watcher::dispatch(rx, coordinator, cancel.clone()));
    let monitor_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    info!("Service started, press Ctrl+C to stop");
    wait_for_shutdown().await?;

    info!("Shutting down");
    cancel.cancel();
    drop(dir_watcher);

    for (name, task) in [
        ("reconciler", reconcile_task),
        ("dispatcher", dispatch_task),
        ("monitor", monitor_task),
    ] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    lock.release()?;
    info!("Service stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl+C")?,
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")
}
