//! Path classification
//!
//! Decides, for each directory met during a walk, whether the walker may
//! descend into it.

use std::path::{Path, PathBuf};

use crate::util::{is_within, normalize};

/// Outcome of classifying one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Include,
    /// Equal to or beneath a configured skip path
    SkipConfigured,
    /// Deeper than the configured max depth
    SkipDepth,
    /// On a different device than the scan root
    SkipOtherMount,
}

/// Classifier bound to one scan root
#[derive(Debug, Clone)]
pub struct PathClassifier {
    root_dev: u64,
    skip_paths: Vec<PathBuf>,
    /// 0 = unlimited
    max_depth: u32,
}

impl PathClassifier {
    pub fn new(root_dev: u64, skip_paths: &[PathBuf], max_depth: u32) -> Self {
        Self {
            root_dev,
            skip_paths: skip_paths.iter().map(|p| normalize(p)).collect(),
            max_depth,
        }
    }

    /// Classify `path`, found `depth` levels below the root on device `dev`.
    ///
    /// Precedence: device boundary, then skip paths, then depth.
    pub fn classify(&self, path: &Path, depth: u32, dev: u64) -> Classification {
        if dev != self.root_dev {
            return Classification::SkipOtherMount;
        }
        if self.is_skipped(path) {
            return Classification::SkipConfigured;
        }
        if self.max_depth > 0 && depth > self.max_depth {
            return Classification::SkipDepth;
        }
        Classification::Include
    }

    /// True when `path` is a configured skip path or lies beneath one
    fn is_skipped(&self, path: &Path) -> bool {
        self.skip_paths.iter().any(|skip| is_within(path, skip))
    }
}
