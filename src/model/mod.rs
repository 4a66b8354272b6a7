mod entry;
mod growth;
mod snapshot;

pub use entry::{Entry, ScanError, ScanErrorKind};
pub use growth::{GrowthRow, HistoryPoint, RemovedRow};
pub use snapshot::{Snapshot, SnapshotStatus, Totals};
