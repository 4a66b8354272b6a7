use anyhow::{Context, Result, bail};
use sqlx::{
    Pool, QueryBuilder, Row, Sqlite, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::model::{Entry, ScanError, ScanErrorKind, SnapshotStatus, Totals};
use crate::util::unix_now;

use super::SCHEMA_VERSION;

/// Rows per multi-row INSERT. Entries bind 9 values per row, which keeps a
/// full chunk well under SQLite's host parameter limit.
const BATCH_SIZE: usize = 1000;

const SECONDS_PER_DAY: i64 = 86_400;

/// Database abstraction for SQLite operations
pub struct Database {
    pub(super) pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let in_memory = db_path == ":memory:";

        // Configure connection options with PRAGMAs applied to every connection
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000"); // 64MB cache

        // An in-memory database lives and dies with its only connection
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        }
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database at {db_path}"))?;

        Ok(Self { pool })
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> Result<bool> {
        // Create metadata table first (needed to check version)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"
        ).execute(&self.pool).await?;

        let stored_version = self.get_metadata("schema_version").await?;

        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(old) = &stored_version {
                warn!(from = %old, to = SCHEMA_VERSION, "schema version changed, rebuilding snapshot store");
            }
            sqlx::query("DROP TABLE IF EXISTS scan_errors").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS entries").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS snapshots").execute(&self.pool).await?;
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mount_point TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                total_size INTEGER,
                total_files INTEGER,
                total_dirs INTEGER,
                status TEXT NOT NULL DEFAULT 'running'
            )"
        ).execute(&self.pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entries (
                snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                file_count INTEGER NOT NULL,
                dir_count INTEGER NOT NULL,
                depth INTEGER NOT NULL,
                parent_path TEXT,
                is_dir INTEGER NOT NULL,
                PRIMARY KEY (snapshot_id, path)
            )"
        ).execute(&self.pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scan_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                UNIQUE (snapshot_id, path, kind)
            )"
        ).execute(&self.pool).await?;

        // browse: children of one directory within one snapshot
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries(snapshot_id, parent_path)")
            .execute(&self.pool).await?;
        // history: one path across snapshots
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_path ON entries(path, snapshot_id)")
            .execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_mount ON snapshots(mount_point, started_at)")
            .execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_status ON snapshots(status)")
            .execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_errors_snapshot ON scan_errors(snapshot_id)")
            .execute(&self.pool).await?;

        if needs_rebuild {
            self.set_metadata("schema_version", SCHEMA_VERSION).await?;
        }

        Ok(needs_rebuild)
    }

    /// Get metadata value by key; Ok(None) when the key is absent
    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read metadata key {key}"))?;
        Ok(row.map(|row| row.get("value")))
    }

    /// Set metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Open a `running` snapshot for a mount point, stamped with the current time
    pub async fn begin_snapshot(&self, mount_point: &str) -> Result<i64> {
        self.begin_snapshot_at(mount_point, unix_now()).await
    }

    /// Open a `running` snapshot with an explicit start time.
    ///
    /// Fails if any snapshot is still `running`: the store accepts a single
    /// writer system-wide.
    pub async fn begin_snapshot_at(&self, mount_point: &str, started_at: i64) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO snapshots (mount_point, started_at, status)
             SELECT ?, ?, 'running'
             WHERE NOT EXISTS (SELECT 1 FROM snapshots WHERE status = 'running')"
        )
        .bind(mount_point)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .context("Failed to create snapshot")?;

        if result.rows_affected() == 0 {
            bail!("another snapshot is already running");
        }

        let id = result.last_insert_rowid();
        debug!(snapshot_id = id, mount_point, "snapshot opened");
        Ok(id)
    }

    /// Append directory aggregates to a running snapshot.
    ///
    /// Rows already present for `(snapshot_id, path)` are left untouched, so
    /// replaying a batch after a failed commit is harmless.
    pub async fn append_entries(&self, snapshot_id: i64, entries: &[Entry]) -> Result<()> {
        self.append_entries_with_callback(snapshot_id, entries, |_| {}).await
    }

    /// Append entries with a callback for progress
    pub async fn append_entries_with_callback<F>(
        &self,
        snapshot_id: i64,
        entries: &[Entry],
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize),
    {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.append_entries_in_tx(&mut tx, snapshot_id, entries, &mut on_progress)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append traversal errors to a running snapshot (idempotent per path and kind)
    pub async fn append_errors(&self, snapshot_id: i64, errors: &[ScanError]) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.append_errors_in_tx(&mut tx, snapshot_id, errors).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append entries and errors in ONE transaction.
    pub async fn append_batch_with_callback<F>(
        &self,
        snapshot_id: i64,
        entries: &[Entry],
        errors: &[ScanError],
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(usize),
    {
        if entries.is_empty() && errors.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        self.append_entries_in_tx(&mut tx, snapshot_id, entries, &mut on_progress)
            .await?;
        self.append_errors_in_tx(&mut tx, snapshot_id, errors).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Write the terminal state of a snapshot.
    ///
    /// This is the only writer of status and totals, and the final write of a
    /// scan. A snapshot that is no longer `running` is rejected.
    pub async fn finalize_snapshot(
        &self,
        snapshot_id: i64,
        totals: Option<Totals>,
        status: SnapshotStatus,
    ) -> Result<()> {
        if !status.is_terminal() {
            bail!("cannot finalize snapshot {snapshot_id} as {status}");
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE snapshots
             SET completed_at = ?, total_size = ?, total_files = ?, total_dirs = ?, status = ?
             WHERE id = ? AND status = 'running'"
        )
        .bind(unix_now())
        .bind(totals.map(|t| t.size as i64))
        .bind(totals.map(|t| t.files as i64))
        .bind(totals.map(|t| t.dirs as i64))
        .bind(status.as_str())
        .bind(snapshot_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to finalize snapshot {snapshot_id}"))?;

        if result.rows_affected() != 1 {
            bail!("snapshot {snapshot_id} is not running");
        }
        tx.commit().await?;
        Ok(())
    }

    /// Mark every `running` snapshot as `failed`.
    ///
    /// Only safe while holding the `WriterLock`: then no scan is live
    /// anywhere, and a `running` row was left by an interrupted process.
    pub async fn reconcile_running(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let now = unix_now();

        sqlx::query(
            "INSERT OR IGNORE INTO scan_errors (snapshot_id, path, kind, message, recorded_at)
             SELECT id, mount_point, ?, 'scan interrupted before completion', ?
             FROM snapshots WHERE status = 'running'"
        )
        .bind(ScanErrorKind::Fatal.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE snapshots SET status = 'failed', completed_at = ? WHERE status = 'running'"
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let count = result.rows_affected();
        if count > 0 {
            warn!(count, "marked stale running snapshots as failed");
        }
        Ok(count)
    }

    /// Delete snapshots started more than `retention_days` ago.
    ///
    /// `0` means keep forever. Returns the number of snapshots removed.
    pub async fn prune_older_than(&self, retention_days: u32) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0);
        }
        let cutoff = unix_now() - i64::from(retention_days) * SECONDS_PER_DAY;
        self.prune_started_before(cutoff).await
    }

    /// Delete finished snapshots whose start time is strictly before `cutoff`.
    ///
    /// Each snapshot is removed in its own transaction together with its
    /// entries and errors.
    pub async fn prune_started_before(&self, cutoff: i64) -> Result<usize> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM snapshots WHERE started_at < ? AND status != 'running' ORDER BY id"
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for &id in &ids {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM entries WHERE snapshot_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM scan_errors WHERE snapshot_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM snapshots WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        if !ids.is_empty() {
            info!(count = ids.len(), cutoff, "pruned old snapshots");
        }
        Ok(ids.len())
    }

    async fn append_entries_in_tx<F>(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        snapshot_id: i64,
        entries: &[Entry],
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(usize),
    {
        for chunk in entries.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO entries \
                 (snapshot_id, path, name, size, file_count, dir_count, depth, parent_path, is_dir) "
            );
            qb.push_values(chunk, |mut row, entry| {
                row.push_bind(snapshot_id)
                    .push_bind(entry.path.as_str())
                    .push_bind(entry.name.as_str())
                    .push_bind(entry.size as i64)
                    .push_bind(entry.file_count as i64)
                    .push_bind(entry.dir_count as i64)
                    .push_bind(i64::from(entry.depth))
                    .push_bind(entry.parent_path.as_deref())
                    .push_bind(entry.is_dir);
            });
            qb.build().execute(&mut **tx).await?;

            on_progress(chunk.len());
        }

        Ok(())
    }

    async fn append_errors_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        snapshot_id: i64,
        errors: &[ScanError],
    ) -> Result<()> {
        let now = unix_now();

        for chunk in errors.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO scan_errors (snapshot_id, path, kind, message, recorded_at) "
            );
            qb.push_values(chunk, |mut row, error| {
                row.push_bind(snapshot_id)
                    .push_bind(error.path.as_str())
                    .push_bind(error.kind.as_str())
                    .push_bind(error.message.as_str())
                    .push_bind(now);
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }
}
