//! Snapshot sink trait for persistence abstraction
//!
//! Decouples the scan pipeline from database implementation details.

use anyhow::Result;

use crate::model::{Entry, ScanError, SnapshotStatus, Totals};

/// Write path of the snapshot store, as seen by a running scan
///
/// This trait abstracts the database operations needed while scanning,
/// allowing the pipeline to be exercised against failing or recording stores.
#[allow(async_fn_in_trait)]
pub trait SnapshotSink {
    /// Open a `running` snapshot and return its id
    async fn begin_snapshot(&self, mount_point: &str) -> Result<i64>;

    /// Append a batch of directory aggregates
    async fn append_entries(&self, snapshot_id: i64, entries: &[Entry]) -> Result<()>;

    /// Append a batch of traversal errors
    async fn append_errors(&self, snapshot_id: i64, errors: &[ScanError]) -> Result<()>;

    /// Write terminal status and totals; the last write of a scan
    async fn finalize_snapshot(
        &self,
        snapshot_id: i64,
        totals: Option<Totals>,
        status: SnapshotStatus,
    ) -> Result<()>;

    /// Append entries and errors together.
    ///
    /// Default implementation is NOT atomic: it appends entries then errors.
    /// Both appends are idempotent, so replaying after a partial failure is safe.
    async fn append_batch(&self, snapshot_id: i64, entries: &[Entry], errors: &[ScanError]) -> Result<()> {
        self.append_entries(snapshot_id, entries).await?;
        self.append_errors(snapshot_id, errors).await?;
        Ok(())
    }
}
