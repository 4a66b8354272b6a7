use serde::Serialize;

/// A path's aggregate at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPoint {
    pub snapshot_id: i64,
    pub taken_at: i64,
    pub size: u64,
    pub file_count: u64,
    pub dir_count: u64,
}

/// Size change of one path between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRow {
    pub path: String,
    pub name: String,
    /// None when the path is new in the later snapshot
    pub previous_size: Option<u64>,
    pub current_size: u64,
    pub delta: i64,
    pub growth_percent: f64,
}

/// A path present in the earlier snapshot but gone from the later one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedRow {
    pub path: String,
    pub name: String,
    pub previous_size: u64,
}
