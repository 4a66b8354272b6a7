use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::model::{GrowthRow, HistoryPoint, RemovedRow, Snapshot};
use crate::repository::Database;
use crate::util::unix_now;

const SECONDS_PER_DAY: i64 = 86_400;

/// Options for growth ranking
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthOptions {
    /// Also rank paths whose size did not change
    pub include_unchanged: bool,
    /// Shallowest directory depth ranked; 0 lets the mount root compete
    pub min_depth: u32,
}

/// Growth between two snapshots, plus the paths that disappeared
#[derive(Debug, Clone, Serialize)]
pub struct GrowthReport {
    pub earlier: Snapshot,
    pub later: Snapshot,
    pub growth: Vec<GrowthRow>,
    pub removed: Vec<RemovedRow>,
}

/// Read-only trend analysis over stored snapshots
#[derive(Clone)]
pub struct GrowthAnalyzer {
    db: Arc<Database>,
}

impl GrowthAnalyzer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Top `limit` paths of snapshot `later` by size gained since `earlier`
    pub async fn rank_growth(
        &self,
        limit: usize,
        earlier: i64,
        later: i64,
        options: GrowthOptions,
    ) -> Result<Vec<GrowthRow>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.db
            .growth_between(earlier, later, limit, options.include_unchanged, options.min_depth)
            .await
    }

    /// Paths of `earlier` that no longer exist in `later`
    pub async fn removed(&self, limit: usize, earlier: i64, later: i64) -> Result<Vec<RemovedRow>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.db.removed_between(earlier, later, limit).await
    }

    /// Growth between the two newest completed snapshots of a mount point.
    ///
    /// None until the mount point has two completed snapshots.
    pub async fn latest_growth(
        &self,
        mount_point: Option<&str>,
        limit: usize,
        include_removed: bool,
        options: GrowthOptions,
    ) -> Result<Option<GrowthReport>> {
        let mount_point = match mount_point {
            Some(mount) => mount.to_string(),
            None => match self.db.get_latest_snapshot(None).await? {
                Some(latest) => latest.mount_point,
                None => return Ok(None),
            },
        };

        let mut recent = self.db.recent_completed(Some(&mount_point), 2).await?;
        if recent.len() < 2 {
            return Ok(None);
        }
        let earlier = recent.remove(1);
        let later = recent.remove(0);

        let growth = self
            .rank_growth(limit, earlier.id, later.id, options)
            .await?;
        let removed = if include_removed {
            self.removed(limit, earlier.id, later.id).await?
        } else {
            Vec::new()
        };

        Ok(Some(GrowthReport { earlier, later, growth, removed }))
    }

    /// Size history of `path` over the trailing `window_days`.
    ///
    /// Only snapshots that contain the path produce points; gaps stay gaps.
    pub async fn history_for(&self, path: &str, window_days: u32) -> Result<Vec<HistoryPoint>> {
        let since = unix_now() - i64::from(window_days) * SECONDS_PER_DAY;
        self.db.history(path, since).await
    }
}
