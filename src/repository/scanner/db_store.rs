//! Database implementation of SnapshotSink

use anyhow::Result;

use crate::model::{Entry, ScanError, SnapshotStatus, Totals};
use crate::repository::Database;

use super::store::SnapshotSink;

impl SnapshotSink for Database {
    async fn begin_snapshot(&self, mount_point: &str) -> Result<i64> {
        Database::begin_snapshot(self, mount_point).await
    }

    async fn append_entries(&self, snapshot_id: i64, entries: &[Entry]) -> Result<()> {
        Database::append_entries(self, snapshot_id, entries).await
    }

    async fn append_errors(&self, snapshot_id: i64, errors: &[ScanError]) -> Result<()> {
        Database::append_errors(self, snapshot_id, errors).await
    }

    async fn finalize_snapshot(
        &self,
        snapshot_id: i64,
        totals: Option<Totals>,
        status: SnapshotStatus,
    ) -> Result<()> {
        Database::finalize_snapshot(self, snapshot_id, totals, status).await
    }

    async fn append_batch(&self, snapshot_id: i64, entries: &[Entry], errors: &[ScanError]) -> Result<()> {
        self.append_batch_with_callback(snapshot_id, entries, errors, |_| {})
            .await
    }
}
