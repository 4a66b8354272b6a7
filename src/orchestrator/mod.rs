//! Scan orchestration
//!
//! Owns the single-flight guarantee: at most one scan run is active in the
//! process, a second request is rejected rather than queued. A run walks the
//! requested mount points one after another, never concurrently.
//!
//! File databases are shared between processes (the CLI and a long-running
//! service may point at the same file), so a run also holds the database's
//! `WriterLock`. Stale `running` rows are reconciled only once that lock is
//! held, which proves no other process is mid-scan.

mod pipeline;
mod progress;

pub use pipeline::{ScanOutcome, scan_mount};
pub use progress::{ProgressHub, ProgressThrottle, ScanEvent, ScanProgress};

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, ScannerConfig};
use crate::repository::{Database, WriterLock};
use crate::util::normalize;

/// Why a scan request was turned away
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanRequestError {
    #[error("a scan is already running")]
    AlreadyRunning,

    #[error("mount point must be an absolute path: {0}")]
    InvalidMountPoint(PathBuf),

    #[error("could not take the database writer lock: {0}")]
    Lock(String),
}

struct Inner {
    db: Arc<Database>,
    /// None for in-memory databases, which no other process can see
    db_path: Option<PathBuf>,
    scanner: ScannerConfig,
    retention_days: u32,
    running: AtomicBool,
    cancel: Arc<AtomicBool>,
    hub: ProgressHub,
}

/// Coordinates scan runs against one database
#[derive(Clone)]
pub struct ScanOrchestrator {
    inner: Arc<Inner>,
}

/// Clears the running flag however the run ends
struct RunningGuard(Arc<Inner>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// An accepted scan run
pub struct ScanHandle {
    join: JoinHandle<Result<Vec<ScanOutcome>>>,
}

impl ScanHandle {
    /// Wait for every mount point of the run to finish
    pub async fn wait(self) -> Result<Vec<ScanOutcome>> {
        self.join
            .await
            .map_err(|err| anyhow!("scan task ended abnormally: {err}"))?
    }
}

impl ScanOrchestrator {
    /// Create the orchestrator. Nothing is written until a scan is requested.
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let db_path = Some(config.database.path.clone()).filter(|p| p.as_os_str() != ":memory:");
        Self {
            inner: Arc::new(Inner {
                db,
                db_path,
                scanner: config.scanner.clone(),
                retention_days: config.retention.days,
                running: AtomicBool::new(false),
                cancel: Arc::new(AtomicBool::new(false)),
                hub: ProgressHub::new(),
            }),
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.inner.hub
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Configured mount points, in scan order
    pub fn mount_points(&self) -> &[PathBuf] {
        &self.inner.scanner.mount_points
    }

    /// Start a scan run in the background.
    ///
    /// With `mount` = None every configured mount point is scanned. Returns
    /// at once; the handle may be dropped without stopping the run.
    pub fn request_scan(&self, mount: Option<&Path>) -> Result<ScanHandle, ScanRequestError> {
        let mounts = match mount {
            Some(path) if !path.is_absolute() => {
                return Err(ScanRequestError::InvalidMountPoint(path.to_path_buf()));
            }
            Some(path) => vec![normalize(path)],
            None => self.inner.scanner.mount_points.clone(),
        };

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("scan request rejected: a scan is already running");
            return Err(ScanRequestError::AlreadyRunning);
        }

        let guard = RunningGuard(Arc::clone(&self.inner));

        let writer = match &self.inner.db_path {
            Some(path) => match WriterLock::try_acquire(path) {
                Ok(Some(lock)) => Some(lock),
                Ok(None) => {
                    info!(db = %path.display(), "scan request rejected: another process holds the writer lock");
                    return Err(ScanRequestError::AlreadyRunning);
                }
                Err(err) => return Err(ScanRequestError::Lock(format!("{err:#}"))),
            },
            None => None,
        };
        self.inner.cancel.store(false, Ordering::Release);

        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let _guard = guard;
            let _writer = writer;
            run(&inner, &mounts).await
        });
        Ok(ScanHandle { join })
    }

    /// Ask the running scan to stop. Returns false when idle.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        warn!("scan cancellation requested");
        self.inner.cancel.store(true, Ordering::Release);
        true
    }
}

async fn run(inner: &Inner, mounts: &[PathBuf]) -> Result<Vec<ScanOutcome>> {
    // Anything still running was left by a process that no longer holds the lock
    inner.db.reconcile_running().await?;

    let mut outcomes = Vec::with_capacity(mounts.len());

    for mount in mounts {
        if inner.cancel.load(Ordering::Acquire) {
            info!(mount = %mount.display(), "skipping mount point after cancellation");
            break;
        }
        match scan_mount(inner.db.as_ref(), mount, &inner.scanner, &inner.cancel, &inner.hub).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                error!(mount = %mount.display(), error = %format!("{err:#}"), "scan aborted");
                return Err(err);
            }
        }
    }

    if inner.retention_days > 0 {
        if let Err(err) = inner.db.prune_older_than(inner.retention_days).await {
            warn!(error = %format!("{err:#}"), "retention pruning failed");
        }
    }

    Ok(outcomes)
}
