//! Read side of the snapshot store
//!
//! Every query here is a plain SELECT: nothing blocks on a running scan and
//! nothing mutates state, so callers may poll as often as they like.

use anyhow::Result;
use sqlx::{Row, sqlite::SqliteRow};

use crate::model::{
    Entry, GrowthRow, HistoryPoint, RemovedRow, ScanError, Snapshot, SnapshotStatus, Totals,
};

use super::Database;

const SNAPSHOT_COLUMNS: &str =
    "id, mount_point, started_at, completed_at, total_size, total_files, total_dirs, status";

const ENTRY_COLUMNS: &str =
    "path, name, size, file_count, dir_count, depth, parent_path, is_dir";

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot> {
    let status: String = row.get("status");
    let total_size: Option<i64> = row.get("total_size");
    let total_files: Option<i64> = row.get("total_files");
    let total_dirs: Option<i64> = row.get("total_dirs");

    let totals = match (total_size, total_files, total_dirs) {
        (Some(size), Some(files), Some(dirs)) => Some(Totals {
            size: size as u64,
            files: files as u64,
            dirs: dirs as u64,
        }),
        _ => None,
    };

    Ok(Snapshot {
        id: row.get("id"),
        mount_point: row.get("mount_point"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        totals,
        status: status.parse()?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Entry {
    Entry {
        path: row.get("path"),
        name: row.get("name"),
        size: row.get::<i64, _>("size") as u64,
        file_count: row.get::<i64, _>("file_count") as u64,
        dir_count: row.get::<i64, _>("dir_count") as u64,
        depth: row.get::<i64, _>("depth") as u32,
        parent_path: row.get("parent_path"),
        is_dir: row.get("is_dir"),
    }
}

impl Database {
    /// Look up one snapshot by id, whatever its status
    pub async fn get_snapshot(&self, snapshot_id: i64) -> Result<Option<Snapshot>> {
        let row = sqlx::query(&format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?"))
            .bind(snapshot_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// Most recent completed snapshot, optionally restricted to one mount point
    pub async fn get_latest_snapshot(&self, mount_point: Option<&str>) -> Result<Option<Snapshot>> {
        Ok(self.recent_completed(mount_point, 1).await?.into_iter().next())
    }

    /// Up to `limit` completed snapshots, newest first
    pub async fn recent_completed(&self, mount_point: Option<&str>, limit: usize) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE status = 'completed' AND (? IS NULL OR mount_point = ?)
             ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(mount_point)
        .bind(mount_point)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// Snapshots of any status, newest first
    pub async fn list_snapshots(&self, mount_point: Option<&str>, limit: usize) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE (? IS NULL OR mount_point = ?)
             ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(mount_point)
        .bind(mount_point)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// The snapshot currently being written, if any
    pub async fn running_snapshot(&self) -> Result<Option<Snapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE status = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(SnapshotStatus::Running.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// One entry by exact path
    pub async fn get_entry(&self, snapshot_id: i64, path: &str) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE snapshot_id = ? AND path = ?"
        ))
        .bind(snapshot_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    /// Immediate children of `parent_path`, largest first
    pub async fn browse(&self, snapshot_id: i64, parent_path: &str) -> Result<Vec<Entry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE snapshot_id = ? AND parent_path = ?
             ORDER BY size DESC, path ASC"
        ))
        .bind(snapshot_id)
        .bind(parent_path)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    /// The mount root entry (depth 0) of a snapshot
    pub async fn root_entry(&self, snapshot_id: i64) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE snapshot_id = ? AND parent_path IS NULL LIMIT 1"
        ))
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    /// Largest entries at one depth
    pub async fn entries_at_depth(&self, snapshot_id: i64, depth: u32, limit: usize) -> Result<Vec<Entry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE snapshot_id = ? AND depth = ?
             ORDER BY size DESC, path ASC LIMIT ?"
        ))
        .bind(snapshot_id)
        .bind(i64::from(depth))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    /// Number of entries recorded for a snapshot
    pub async fn count_entries(&self, snapshot_id: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE snapshot_id = ?")
            .bind(snapshot_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Size of `path` in every completed snapshot started at or after `since`,
    /// oldest first. Snapshots without the path contribute no point.
    pub async fn history(&self, path: &str, since: i64) -> Result<Vec<HistoryPoint>> {
        let rows = sqlx::query(
            "SELECT s.id AS snapshot_id, s.started_at, e.size, e.file_count, e.dir_count
             FROM entries e
             JOIN snapshots s ON s.id = e.snapshot_id
             WHERE e.path = ? AND s.status = 'completed' AND s.started_at >= ?
             ORDER BY s.started_at ASC, s.id ASC"
        )
        .bind(path)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HistoryPoint {
                snapshot_id: row.get("snapshot_id"),
                taken_at: row.get("started_at"),
                size: row.get::<i64, _>("size") as u64,
                file_count: row.get::<i64, _>("file_count") as u64,
                dir_count: row.get::<i64, _>("dir_count") as u64,
            })
            .collect())
    }

    /// Directories of `later` ranked by growth against `earlier`.
    ///
    /// Only directory rows are ranked; file rows stored with `track_files`
    /// never show up. Every directory from `min_depth` down competes, so with
    /// `min_depth` = 0 the mount root and each ancestor of a growing path
    /// rank alongside it, the root usually first.
    ///
    /// Paths new in `later` count their full size. Shrunk paths never
    /// qualify; unchanged paths only with `include_unchanged`. Ordering is
    /// delta desc, current size desc, path asc.
    pub async fn growth_between(
        &self,
        earlier: i64,
        later: i64,
        limit: usize,
        include_unchanged: bool,
        min_depth: u32,
    ) -> Result<Vec<GrowthRow>> {
        let min_delta: i64 = if include_unchanged { 0 } else { 1 };
        let rows = sqlx::query(
            "SELECT cur.path, cur.name, prev.size AS previous_size, cur.size AS current_size,
                    cur.size - COALESCE(prev.size, 0) AS delta
             FROM entries cur
             LEFT JOIN entries prev ON prev.snapshot_id = ? AND prev.path = cur.path AND prev.is_dir = 1
             WHERE cur.snapshot_id = ? AND cur.is_dir = 1 AND cur.depth >= ?
               AND cur.size - COALESCE(prev.size, 0) >= ?
             ORDER BY delta DESC, current_size DESC, cur.path ASC
             LIMIT ?"
        )
        .bind(earlier)
        .bind(later)
        .bind(i64::from(min_depth))
        .bind(min_delta)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let previous: Option<i64> = row.get("previous_size");
                let delta: i64 = row.get("delta");
                let growth_percent = match previous {
                    Some(prev) if prev > 0 => (delta as f64 * 100.0 / prev as f64 * 100.0).round() / 100.0,
                    Some(_) if delta == 0 => 0.0,
                    _ => 100.0,
                };
                GrowthRow {
                    path: row.get("path"),
                    name: row.get("name"),
                    previous_size: previous.map(|p| p as u64),
                    current_size: row.get::<i64, _>("current_size") as u64,
                    delta,
                    growth_percent,
                }
            })
            .collect())
    }

    /// Directories present in `earlier` but absent from `later`, largest first
    pub async fn removed_between(&self, earlier: i64, later: i64, limit: usize) -> Result<Vec<RemovedRow>> {
        let rows = sqlx::query(
            "SELECT prev.path, prev.name, prev.size
             FROM entries prev
             WHERE prev.snapshot_id = ? AND prev.is_dir = 1
               AND NOT EXISTS (
                   SELECT 1 FROM entries cur WHERE cur.snapshot_id = ? AND cur.path = prev.path
               )
             ORDER BY prev.size DESC, prev.path ASC
             LIMIT ?"
        )
        .bind(earlier)
        .bind(later)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RemovedRow {
                path: row.get("path"),
                name: row.get("name"),
                previous_size: row.get::<i64, _>("size") as u64,
            })
            .collect())
    }

    /// Traversal errors recorded for a snapshot, in recording order
    pub async fn scan_errors(&self, snapshot_id: i64, limit: usize) -> Result<Vec<ScanError>> {
        let rows = sqlx::query(
            "SELECT path, kind, message FROM scan_errors
             WHERE snapshot_id = ? ORDER BY id ASC LIMIT ?"
        )
        .bind(snapshot_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.get("kind");
                Ok(ScanError {
                    path: row.get("path"),
                    kind: kind.parse()?,
                    message: row.get("message"),
                })
            })
            .collect()
    }
}
