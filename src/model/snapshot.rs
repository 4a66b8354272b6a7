use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a snapshot row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Running,
    Completed,
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Running => "running",
            SnapshotStatus::Completed => "completed",
            SnapshotStatus::Failed => "failed",
        }
    }

    /// Completed and failed snapshots are never written again
    pub fn is_terminal(self) -> bool {
        !matches!(self, SnapshotStatus::Running)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SnapshotStatus::Running),
            "completed" => Ok(SnapshotStatus::Completed),
            "failed" => Ok(SnapshotStatus::Failed),
            other => anyhow::bail!("unknown snapshot status: {other}"),
        }
    }
}

/// Aggregate totals of one scan, equal to the root entry's aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub size: u64,
    pub files: u64,
    pub dirs: u64,
}

/// One scan run over one mount point
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub mount_point: String,
    /// UNIX seconds, UTC
    pub started_at: i64,
    pub completed_at: Option<i64>,
    /// Absent while running
    pub totals: Option<Totals>,
    pub status: SnapshotStatus,
}
