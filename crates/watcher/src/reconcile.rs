//! Reconciliation scanner
//!
//! Feeds files the watcher never reported through the normal event path:
//! everything already present at startup (streams interrupted while the
//! daemon was down), then on every interval the files whose mtime moved
//! since the previous scan (missed or overflowed notifications).

use crate::event::FileEvent;
use crate::filter::SuffixFilter;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct Reconciler {
    /// Watched directory (not descended into)
    root: PathBuf,
    filter: SuffixFilter,
    /// Scan interval; `None` runs only the startup scan
    interval: Option<Duration>,
    /// Start of the previous scan (used for mtime comparison)
    last_scan: SystemTime,
}

impl Reconciler {
    pub fn new(root: PathBuf, filter: SuffixFilter, interval: Option<Duration>) -> Self {
        Self {
            root,
            filter,
            interval,
            last_scan: SystemTime::UNIX_EPOCH,
        }
    }

    /// Startup scan, then periodic scans until cancelled
    pub async fn run(mut self, tx: mpsc::UnboundedSender<FileEvent>, cancel: CancellationToken) {
        match self.scan() {
            Ok(found) => {
                info!("Startup scan found {} file(s) in {}", found.len(), self.root.display());
                if !send_all(&tx, found) {
                    return;
                }
            }
            Err(e) => warn!("Startup scan of {} failed: {}", self.root.display(), e),
        }

        let Some(period) = self.interval else {
            return;
        };
        info!("Starting periodic reconciliation (interval: {:?})", period);

        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        timer.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            match self.scan() {
                Ok(changed) if changed.is_empty() => {
                    debug!("Periodic reconciliation: no missed changes");
                }
                Ok(changed) => {
                    info!("Periodic reconciliation found {} missed changes", changed.len());
                    if !send_all(&tx, changed) {
                        break;
                    }
                }
                Err(e) => warn!("Periodic reconciliation scan failed: {}", e),
            }
        }
    }

    /// Matching files modified since the previous scan
    ///
    /// The first scan reports every matching file.
    pub fn scan(&mut self) -> Result<Vec<PathBuf>> {
        let started = SystemTime::now();
        let changed = scan_dir(&self.root, &self.filter, self.last_scan)?;
        self.last_scan = started;
        Ok(changed)
    }
}

/// Matching regular files directly under `root` with mtime after `since`
pub fn scan_dir(root: &Path, filter: &SuffixFilter, since: SystemTime) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() || !filter.matches(entry.path()) {
            continue;
        }

        let mtime = entry.metadata()?.modified()?;
        if mtime > since {
            changed.push(entry.into_path());
        }
    }

    Ok(changed)
}

fn send_all(tx: &mpsc::UnboundedSender<FileEvent>, paths: Vec<PathBuf>) -> bool {
    for path in paths {
        if tx.send(FileEvent::modified(path)).is_err() {
            debug!("Event receiver closed, stopping reconciliation");
            return false;
        }
    }
    true
}
