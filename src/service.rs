//! Query and control surface for the web/API layer
//!
//! Wraps the store, the growth analyzer and the orchestrator behind the
//! operations a dashboard needs. Bad input comes back as `QueryError`,
//! never as a panic.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::analysis::{GrowthAnalyzer, GrowthOptions, GrowthReport};
use crate::config::Config;
use crate::model::{Entry, GrowthRow, HistoryPoint, ScanError, Snapshot, SnapshotStatus};
use crate::orchestrator::{ScanHandle, ScanOrchestrator, ScanProgress, ScanRequestError};
use crate::repository::Database;
use crate::util::{is_within, normalize, path_key};

const MAX_LIST_LIMIT: usize = 1000;
const MAX_HISTORY_DAYS: u32 = 3650;
const OVERVIEW_TOP_DIRECTORIES: usize = 20;
const OVERVIEW_TOP_GROWTH: usize = 10;

/// Errors reported to query callers
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Whether a scan is running and how far along it is
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub running: bool,
    pub progress: Option<ScanProgress>,
}

/// Dashboard landing data
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    /// None until the first scan completes
    pub snapshot: Option<Snapshot>,
    pub top_directories: Vec<Entry>,
    pub top_growth: Vec<GrowthRow>,
}

/// One directory and its immediate children
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub snapshot_id: i64,
    pub current: Entry,
    pub children: Vec<Entry>,
}

/// Facade over the snapshot store, analyzer and orchestrator
#[derive(Clone)]
pub struct DiskTrend {
    db: Arc<Database>,
    analyzer: GrowthAnalyzer,
    orchestrator: ScanOrchestrator,
}

impl DiskTrend {
    /// Open (creating if needed) the configured database
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = &config.database.path;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let db_path = db_path.to_str().context("Invalid database path encoding")?;
        let db = Database::new(db_path).await?;
        db.init_schema().await?;
        Ok(Self::with_database(Arc::new(db), config))
    }

    /// Build on an already initialised database.
    ///
    /// Read-only: stale `running` snapshots are left for the next scan run to
    /// reconcile under the writer lock.
    pub fn with_database(db: Arc<Database>, config: &Config) -> Self {
        Self {
            analyzer: GrowthAnalyzer::new(Arc::clone(&db)),
            orchestrator: ScanOrchestrator::new(Arc::clone(&db), config),
            db,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }

    pub fn analyzer(&self) -> &GrowthAnalyzer {
        &self.analyzer
    }

    pub fn get_status(&self) -> ScanStatus {
        ScanStatus {
            running: self.orchestrator.is_running(),
            progress: self.orchestrator.hub().current(),
        }
    }

    pub async fn get_overview(&self) -> QueryResult<Overview> {
        let Some(snapshot) = self.db.get_latest_snapshot(None).await? else {
            return Ok(Overview { snapshot: None, top_directories: Vec::new(), top_growth: Vec::new() });
        };

        let top_directories = self
            .db
            .entries_at_depth(snapshot.id, 1, OVERVIEW_TOP_DIRECTORIES)
            .await?
            .into_iter()
            .filter(|entry| entry.is_dir)
            .collect();
        let top_growth = self
            .analyzer
            .latest_growth(Some(&snapshot.mount_point), OVERVIEW_TOP_GROWTH, false, GrowthOptions::default())
            .await?
            .map(|report| report.growth)
            .unwrap_or_default();

        Ok(Overview { snapshot: Some(snapshot), top_directories, top_growth })
    }

    pub async fn list_snapshots(&self, mount_point: Option<&str>, limit: usize) -> QueryResult<Vec<Snapshot>> {
        check_limit(limit)?;
        Ok(self.db.list_snapshots(mount_point, limit).await?)
    }

    pub async fn get_snapshot(&self, snapshot_id: i64) -> QueryResult<Snapshot> {
        self.db
            .get_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("snapshot {snapshot_id}")))
    }

    /// A directory and its children, largest first.
    ///
    /// Without a snapshot id, the latest completed snapshot of the mount
    /// point containing `path` is used.
    pub async fn browse(&self, snapshot_id: Option<i64>, path: &str) -> QueryResult<Listing> {
        let path = normalized_key(path)?;

        let snapshot = match snapshot_id {
            Some(id) => self.get_snapshot(id).await?,
            None => self
                .latest_snapshot_covering(Path::new(&path))
                .await?
                .ok_or_else(|| QueryError::NotFound("no completed snapshot".to_string()))?,
        };
        if snapshot.status == SnapshotStatus::Running {
            return Err(QueryError::InvalidArgument(format!(
                "snapshot {} is still running",
                snapshot.id
            )));
        }

        let current = self
            .db
            .get_entry(snapshot.id, &path)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("path {path} in snapshot {}", snapshot.id)))?;
        let children = self.db.browse(snapshot.id, &path).await?;

        Ok(Listing { snapshot_id: snapshot.id, current, children })
    }

    /// Size history of a path over the last `days` days
    pub async fn history(&self, path: &str, days: u32) -> QueryResult<Vec<HistoryPoint>> {
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(QueryError::InvalidArgument(format!(
                "days must be between 1 and {MAX_HISTORY_DAYS}"
            )));
        }
        let path = normalized_key(path)?;
        Ok(self.analyzer.history_for(&path, days).await?)
    }

    /// Fastest-growing directories between the two newest snapshots,
    /// the mount root included
    pub async fn top_growth(&self, limit: usize) -> QueryResult<Vec<GrowthRow>> {
        Ok(self
            .growth_report(None, limit, false, 0)
            .await?
            .map(|report| report.growth)
            .unwrap_or_default())
    }

    /// Full growth report, optionally with removed paths.
    ///
    /// Directories shallower than `min_depth` are left out of the ranking.
    pub async fn growth_report(
        &self,
        mount_point: Option<&str>,
        limit: usize,
        include_removed: bool,
        min_depth: u32,
    ) -> QueryResult<Option<GrowthReport>> {
        check_limit(limit)?;
        let mount_point = mount_point.map(normalized_key).transpose()?;
        let options = GrowthOptions { min_depth, ..Default::default() };
        Ok(self
            .analyzer
            .latest_growth(mount_point.as_deref(), limit, include_removed, options)
            .await?)
    }

    pub async fn scan_errors(&self, snapshot_id: i64, limit: usize) -> QueryResult<Vec<ScanError>> {
        check_limit(limit)?;
        self.get_snapshot(snapshot_id).await?;
        Ok(self.db.scan_errors(snapshot_id, limit).await?)
    }

    /// Start a scan of one mount point, or of all configured ones
    pub fn trigger_scan(&self, mount: Option<&Path>) -> Result<ScanHandle, ScanRequestError> {
        self.orchestrator.request_scan(mount)
    }

    pub fn cancel_scan(&self) -> bool {
        self.orchestrator.cancel()
    }

    /// Remove snapshots older than `days` (0 keeps everything)
    pub async fn prune(&self, days: u32) -> QueryResult<usize> {
        Ok(self.db.prune_older_than(days).await?)
    }

    async fn latest_snapshot_covering(&self, path: &Path) -> Result<Option<Snapshot>> {
        let mut mounts: Vec<&PathBuf> = self
            .orchestrator
            .mount_points()
            .iter()
            .filter(|mount| is_within(path, mount))
            .collect();
        // Most specific mount point first
        mounts.sort_by_key(|mount| std::cmp::Reverse(mount.components().count()));

        for mount in mounts {
            if let Some(snapshot) = self.db.get_latest_snapshot(Some(&path_key(mount))).await? {
                return Ok(Some(snapshot));
            }
        }
        self.db.get_latest_snapshot(None).await
    }
}

fn check_limit(limit: usize) -> QueryResult<()> {
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(QueryError::InvalidArgument(format!(
            "limit must be between 1 and {MAX_LIST_LIMIT}"
        )));
    }
    Ok(())
}

fn normalized_key(path: &str) -> QueryResult<String> {
    let path = Path::new(path);
    if !path.is_absolute() {
        return Err(QueryError::InvalidArgument(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    Ok(path_key(&normalize(path)).into_owned())
}
