//! Filesystem scanner
//!
//! Walks one mount point and hands its aggregates to a snapshot sink.
//!
//! # Architecture
//!
//! - **classifier**: include / skip decisions per directory
//! - **walker**: iterative post-order traversal producing walk events
//! - **types**: walk events, options and fatal conditions
//! - **store**: persistence trait used by the scan pipeline
//! - **db_store**: Database implementation of SnapshotSink

mod classifier;
mod db_store;
mod store;
mod types;
mod walker;

pub use classifier::{Classification, PathClassifier};
pub use store::SnapshotSink;
pub use types::{WalkEvent, WalkFatal, WalkOptions};
pub use walker::TreeWalker;
