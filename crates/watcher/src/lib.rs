//! File system watching for streamdrop
//!
//! This crate provides:
//! - A `notify` based watcher for one directory (non-recursive)
//! - Normalized create/modify/delete events
//! - Suffix filtering
//! - The `FileChangeHandler` callback contract and an event dispatcher
//! - Startup and periodic reconciliation scans

pub mod event;
pub mod filter;
pub mod reconcile;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Re-exports
pub use event::{FileEvent, FileEventKind};
pub use filter::SuffixFilter;
pub use reconcile::Reconciler;

/// Receiver of file change notifications
#[async_trait]
pub trait FileChangeHandler: Send + Sync {
    async fn on_file_changed(&self, event: FileEvent);
}

/// Watches one directory and forwards normalized events to a channel
///
/// Watching stops when the value is dropped.
pub struct DirWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirWatcher {
    pub fn start(root: &Path, tx: mpsc::UnboundedSender<FileEvent>) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for change in event::from_notify(&event) {
                        // Receiver gone means shutdown
                        let _ = tx.send(change);
                    }
                }
                Err(e) => warn!("File watcher error: {}", e),
            }
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        info!("Watching {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Deliver events to `handler` until cancelled or the channel closes
///
/// Each event runs on its own task so a long upload does not hold back
/// notifications for other files. On return every started task has finished.
pub async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<FileEvent>,
    handler: Arc<dyn FileChangeHandler>,
    cancel: CancellationToken,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => {
                    let handler = Arc::clone(&handler);
                    tasks.spawn(async move { handler.on_file_changed(event).await });
                }
                None => break,
            },
            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = done {
                    warn!("File event task failed: {}", e);
                }
            }
        }
    }

    if !tasks.is_empty() {
        info!("Waiting for {} in-flight event task(s)", tasks.len());
    }
    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            warn!("File event task failed: {}", e);
        }
    }
    debug!("Event dispatch stopped");
}
