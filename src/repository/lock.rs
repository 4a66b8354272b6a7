//! Cross-process writer lock
//!
//! Only the process holding the lock may begin snapshots or reconcile stale
//! `running` rows. It is an flock(2) on a sidecar file next to the database,
//! so the kernel releases it when the holder exits, crashed or not.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held writer lock, released on drop
pub struct WriterLock {
    _lock: Flock<File>,
}

impl WriterLock {
    /// Take the lock for `db_path` without waiting.
    ///
    /// Ok(None) means another holder, possibly in another process, has it.
    pub fn try_acquire(db_path: &Path) -> Result<Option<Self>> {
        let path = lock_path(db_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!(path = %path.display(), "writer lock acquired");
                Ok(Some(Self { _lock: lock }))
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => {
                Err(anyhow::Error::new(errno).context(format!("Failed to lock {}", path.display())))
            }
        }
    }
}

/// Sidecar lock file for a database path
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
