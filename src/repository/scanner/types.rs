//! Domain types for filesystem walking
//!
//! These types form the data contract between the walker and the code that
//! persists its output.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{Entry, ScanError};

/// One item produced by the walker
#[derive(Debug, Clone)]
pub enum WalkEvent {
    /// A finalized aggregate; children always precede their parent
    Entry(Entry),
    /// A per-entry failure; traversal carries on
    Error(ScanError),
}

/// Conditions that prevent a walk from starting at all
#[derive(Debug, Error)]
pub enum WalkFatal {
    #[error("scan root {path} is inaccessible: {source}")]
    RootInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("scan root {0} must be an absolute path")]
    RelativeRoot(PathBuf),
}

/// Options controlling a single walk
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub skip_paths: Vec<PathBuf>,
    /// 0 = unlimited
    pub max_depth: u32,
    /// Emit an Entry row for every regular file as well
    pub track_files: bool,
}
