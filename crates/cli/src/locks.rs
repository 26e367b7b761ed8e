//! Lock file management for daemon exclusivity
//!
//! One daemon per state directory; a second `run` against the same
//! directory refuses to start instead of racing the first on checkpoints.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Held daemon lock; released on drop
pub struct DaemonLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: i64,
}

fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join("locks/daemon.lock")
}

impl DaemonLock {
    /// Acquire exclusive daemon lock
    ///
    /// Fails when another live process holds it.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        let lock_path = lock_path(state_dir);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create locks directory")?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        if !try_flock_exclusive(&file)? {
            if Self::is_stale_lock(&mut file)? {
                tracing::warn!("Removing stale daemon lock");
                drop(file);
                std::fs::remove_file(&lock_path)?;
                return Self::acquire(state_dir);
            } else {
                anyhow::bail!(
                    "Daemon already running (lock file {} held by active process)",
                    lock_path.display()
                );
            }
        }

        Self::write_lock_content(&mut file)?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    /// PID of the daemon currently holding the lock, if any
    pub fn holder(state_dir: &Path) -> Option<u32> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(lock_path(state_dir))
            .ok()?;

        // Lockable means nobody holds it; the lock goes away with `file`
        if try_flock_exclusive(&file).ok()? {
            return None;
        }

        Self::read_lock_content(&mut file)
            .ok()
            .map(|content| content.pid)
            .filter(|pid| is_process_alive(*pid))
    }

    /// Release the daemon lock
    pub fn release(self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .context("Failed to remove lock file")?;
        Ok(())
    }

    fn is_stale_lock(file: &mut File) -> Result<bool> {
        match Self::read_lock_content(file) {
            Ok(content) => Ok(!is_process_alive(content.pid)),
            // Unreadable content: assume stale
            Err(_) => Ok(true),
        }
    }

    fn write_lock_content(file: &mut File) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: sd_core::time::epoch_millis(),
        };

        let serialized = serde_json::to_string(&content)
            .context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let content: LockContent = serde_json::from_str(&contents)
            .context("Failed to deserialize lock content")?;
        Ok(content)
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

/// Check if process is alive
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Null signal: existence check only
    match kill(Pid::from_raw(raw), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // Permission denied: exists under another user
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
