//! One mount point, end to end
//!
//! Opens a snapshot, runs the walker on a blocking thread, streams its
//! events into the sink in batches and writes the terminal status.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::ScannerConfig;
use crate::model::{Entry, ScanError, ScanErrorKind, SnapshotStatus, Totals};
use crate::repository::scanner::{SnapshotSink, TreeWalker, WalkEvent, WalkOptions};
use crate::util::{format_size, path_key};

use super::progress::{ProgressHub, ProgressThrottle, ScanEvent, ScanProgress};

/// Walk events buffered between the walker thread and the sink
const CHANNEL_CAPACITY: usize = 4096;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Result of scanning one mount point
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub mount_point: String,
    pub snapshot_id: i64,
    pub status: SnapshotStatus,
    pub totals: Option<Totals>,
    pub entries_processed: u64,
    pub errors_recorded: u64,
    pub elapsed_ms: u64,
    /// Reason for a `failed` status
    pub failure: Option<String>,
}

#[derive(Default)]
struct Batch {
    entries: Vec<Entry>,
    errors: Vec<ScanError>,
}

impl Batch {
    fn len(&self) -> usize {
        self.entries.len() + self.errors.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.errors.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.errors.clear();
    }
}

#[derive(Default)]
struct WalkSummary {
    entries: u64,
    errors: u64,
    root: Option<Totals>,
    cancelled: bool,
}

/// Scan one mount point into a fresh snapshot.
///
/// Traversal and storage failures end up as a `failed` snapshot and an
/// `Ok` outcome. Only failing to open or to finalize the snapshot is
/// returned as an error, since either leaves the store in doubt.
pub async fn scan_mount<S: SnapshotSink>(
    store: &S,
    mount: &Path,
    config: &ScannerConfig,
    cancel: &Arc<AtomicBool>,
    hub: &ProgressHub,
) -> Result<ScanOutcome> {
    let started = Instant::now();
    let mount_point = path_key(mount).into_owned();

    let snapshot_id = store
        .begin_snapshot(&mount_point)
        .await
        .with_context(|| format!("Failed to open snapshot for {mount_point}"))?;

    info!(snapshot_id, mount_point = %mount_point, "scan started");
    hub.publish(ScanEvent::Started { snapshot_id, mount_point: mount_point.clone() });

    let mut summary = WalkSummary::default();
    let walked = walk_into(store, snapshot_id, mount, config, cancel, hub, started, &mut summary).await;

    let (status, totals, failure) = match walked {
        Ok(()) if summary.cancelled => (SnapshotStatus::Failed, None, Some("scan cancelled".to_string())),
        Ok(()) => match summary.root {
            Some(totals) => (SnapshotStatus::Completed, Some(totals), None),
            None => (SnapshotStatus::Failed, None, Some("walk ended without a root entry".to_string())),
        },
        Err(err) => (SnapshotStatus::Failed, None, Some(format!("{err:#}"))),
    };

    if let Some(reason) = &failure {
        warn!(snapshot_id, mount_point = %mount_point, reason = %reason, "scan failed");
        let fatal = ScanError::new(mount_point.as_str(), ScanErrorKind::Fatal, reason.as_str());
        if let Err(err) = store.append_errors(snapshot_id, &[fatal]).await {
            warn!(snapshot_id, error = %err, "could not record fatal scan error");
        }
    }

    store
        .finalize_snapshot(snapshot_id, totals, status)
        .await
        .with_context(|| format!("Failed to finalize snapshot {snapshot_id} as {status}"))?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if let Some(totals) = totals {
        info!(
            snapshot_id,
            mount_point = %mount_point,
            dirs = totals.dirs,
            files = totals.files,
            size = %format_size(totals.size),
            errors = summary.errors,
            elapsed_ms,
            "scan completed"
        );
    }

    hub.publish(ScanEvent::Finished {
        snapshot_id,
        mount_point: mount_point.clone(),
        status,
        totals,
        entries_processed: summary.entries,
        errors_recorded: summary.errors,
        elapsed_ms,
    });

    Ok(ScanOutcome {
        mount_point,
        snapshot_id,
        status,
        totals,
        entries_processed: summary.entries,
        errors_recorded: summary.errors,
        elapsed_ms,
        failure,
    })
}

#[allow(clippy::too_many_arguments)]
async fn walk_into<S: SnapshotSink>(
    store: &S,
    snapshot_id: i64,
    mount: &Path,
    config: &ScannerConfig,
    cancel: &Arc<AtomicBool>,
    hub: &ProgressHub,
    started: Instant,
    summary: &mut WalkSummary,
) -> Result<()> {
    let options = WalkOptions {
        skip_paths: config.skip_paths.clone(),
        max_depth: config.max_depth,
        track_files: config.track_files,
    };
    let root = mount.to_path_buf();
    let walker_cancel = Arc::clone(cancel);
    let walker = tokio::task::spawn_blocking(move || TreeWalker::open(&root, &options, walker_cancel))
        .await
        .context("walker task panicked")??;

    let (tx, mut rx) = mpsc::channel::<WalkEvent>(CHANNEL_CAPACITY);
    let producer = tokio::task::spawn_blocking(move || {
        let mut walker = walker;
        for event in walker.by_ref() {
            if tx.blocking_send(event).is_err() {
                // Consumer gave up (storage failure)
                break;
            }
        }
        walker.was_cancelled()
    });

    let mut ticker = tokio::time::interval(config.flush_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut throttle = ProgressThrottle::new(config.progress_interval());
    let mut batch = Batch::default();
    let mut current_path = path_key(mount).into_owned();

    let streamed: Result<()> = loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break Ok(()) };
                match event {
                    WalkEvent::Entry(entry) => {
                        summary.entries += 1;
                        if entry.parent_path.is_none() {
                            summary.root = Some(Totals {
                                size: entry.size,
                                files: entry.file_count,
                                dirs: entry.dir_count,
                            });
                        }
                        current_path.clone_from(&entry.path);
                        batch.entries.push(entry);
                    }
                    WalkEvent::Error(error) => {
                        summary.errors += 1;
                        batch.errors.push(error);
                    }
                }

                if throttle.ready() {
                    hub.publish(ScanEvent::Progress(ScanProgress {
                        snapshot_id,
                        mount_point: path_key(mount).into_owned(),
                        path_being_scanned: current_path.clone(),
                        entries_processed: summary.entries,
                        errors_recorded: summary.errors,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }));
                }

                if batch.len() < config.batch_size {
                    continue;
                }
            }
            _ = ticker.tick() => {
                if batch.is_empty() {
                    continue;
                }
            }
        }

        if let Err(err) = flush(store, snapshot_id, &mut batch, config.append_retries).await {
            break Err(err);
        }
    };

    let streamed = match streamed {
        Ok(()) => flush(store, snapshot_id, &mut batch, config.append_retries).await,
        Err(err) => Err(err),
    };

    // Unblocks the walker thread if we stopped consuming early
    drop(rx);
    summary.cancelled = producer.await.map_err(|err| anyhow!("walker thread panicked: {err}"))?;

    if summary.cancelled {
        summary.root = None;
    }
    streamed
}

/// Backoff before retry number `attempt` (1-based): doubles, then holds at the cap
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BASE_DELAY.saturating_mul(factor).min(RETRY_MAX_DELAY)
}

/// Append the buffered rows, retrying a bounded number of times
async fn flush<S: SnapshotSink>(store: &S, snapshot_id: i64, batch: &mut Batch, retries: u32) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut attempt = 0;
    loop {
        match store.append_batch(snapshot_id, &batch.entries, &batch.errors).await {
            Ok(()) => {
                batch.clear();
                return Ok(());
            }
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(snapshot_id, attempt, error = %err, "append failed, retrying");
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            Err(err) => {
                return Err(err.context(format!(
                    "append to snapshot {snapshot_id} failed after {} attempts",
                    attempt + 1
                )));
            }
        }
    }
}
