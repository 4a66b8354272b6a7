//! Post-order filesystem walker
//!
//! Produces one aggregate per directory, children before parents, using an
//! explicit stack of open directories instead of call recursion. Per-entry
//! failures become `WalkEvent::Error` items and never stop the walk.

use std::collections::VecDeque;
use std::fs::{self, ReadDir};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::model::{Entry, ScanError};
use crate::util::{base_name, normalize, path_key};

use super::classifier::{Classification, PathClassifier};
use super::types::{WalkEvent, WalkFatal, WalkOptions};

/// A directory whose children are still being visited
struct Frame {
    path: PathBuf,
    depth: u32,
    size: u64,
    files: u64,
    dirs: u64,
    /// Included subdirectories not yet descended into
    subdirs: Vec<PathBuf>,
}

impl Frame {
    fn new(path: PathBuf, depth: u32) -> Self {
        Self { path, depth, size: 0, files: 0, dirs: 0, subdirs: Vec::new() }
    }
}

/// Iterator over the walk of one mount point
pub struct TreeWalker {
    root: PathBuf,
    classifier: PathClassifier,
    track_files: bool,
    cancel: Arc<AtomicBool>,
    stack: Vec<Frame>,
    pending: VecDeque<WalkEvent>,
    cancelled: bool,
}

impl TreeWalker {
    /// Open the scan root and list it.
    ///
    /// The root is the one place a failure is fatal. The root itself is
    /// never classified, so an explicitly configured root is always walked.
    pub fn open(root: &Path, options: &WalkOptions, cancel: Arc<AtomicBool>) -> Result<Self, WalkFatal> {
        if !root.is_absolute() {
            return Err(WalkFatal::RelativeRoot(root.to_path_buf()));
        }
        let root = normalize(root);

        let metadata = fs::metadata(&root).map_err(|source| WalkFatal::RootInaccessible {
            path: root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(WalkFatal::NotADirectory(root));
        }

        let listing = fs::read_dir(&root).map_err(|source| WalkFatal::RootInaccessible {
            path: root.clone(),
            source,
        })?;

        let mut walker = Self {
            classifier: PathClassifier::new(metadata.dev(), &options.skip_paths, options.max_depth),
            root: root.clone(),
            track_files: options.track_files,
            cancel,
            stack: Vec::new(),
            pending: VecDeque::new(),
            cancelled: false,
        };
        let frame = walker.list_dir(root, 0, listing);
        walker.stack.push(frame);
        Ok(walker)
    }

    /// True when the walk ended because the cancel flag was raised
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Read every child of a directory: files are summed into the frame,
    /// included subdirectories are queued for descent.
    fn list_dir(&mut self, path: PathBuf, depth: u32, listing: ReadDir) -> Frame {
        let mut frame = Frame::new(path, depth);

        for item in listing {
            let dirent = match item {
                Ok(dirent) => dirent,
                Err(err) => {
                    self.push_error(&frame.path, &err);
                    continue;
                }
            };

            let child = dirent.path();
            // DirEntry::metadata does not traverse symlinks
            let metadata = match dirent.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.push_error(&child, &err);
                    continue;
                }
            };

            let file_type = metadata.file_type();
            if file_type.is_symlink() {
                // Opaque leaf: the link's own size, never followed
                frame.size += metadata.len();
            } else if file_type.is_file() {
                frame.size += metadata.len();
                frame.files += 1;
                if self.track_files {
                    let entry = file_entry(&child, &frame.path, depth + 1, metadata.len());
                    self.pending.push_back(WalkEvent::Entry(entry));
                }
            } else if file_type.is_dir() {
                match self.classifier.classify(&child, depth + 1, metadata.dev()) {
                    Classification::Include => frame.subdirs.push(child),
                    skipped => debug!(path = %child.display(), ?skipped, "not descending"),
                }
            }
        }

        frame
    }

    fn descend(&mut self, path: PathBuf, depth: u32) {
        match fs::read_dir(&path) {
            Ok(listing) => {
                let frame = self.list_dir(path, depth, listing);
                self.stack.push(frame);
            }
            Err(err) => {
                // Still recorded, as an empty directory
                self.push_error(&path, &err);
                self.stack.push(Frame::new(path, depth));
            }
        }
    }

    fn push_error(&mut self, path: &Path, err: &std::io::Error) {
        debug!(path = %path.display(), error = %err, "traversal error");
        self.pending
            .push_back(WalkEvent::Error(ScanError::from_io(path_key(path), err)));
    }

    /// Turn a fully visited frame into its Entry and roll it into the parent
    fn finish(&mut self, frame: Frame) -> Entry {
        let parent_path = match self.stack.last_mut() {
            Some(parent) => {
                parent.size += frame.size;
                parent.files += frame.files;
                parent.dirs += frame.dirs + 1;
                Some(path_key(&parent.path).into_owned())
            }
            None => None,
        };

        Entry {
            path: path_key(&frame.path).into_owned(),
            name: base_name(&frame.path),
            size: frame.size,
            file_count: frame.files,
            dir_count: frame.dirs,
            depth: frame.depth,
            parent_path,
            is_dir: true,
        }
    }
}

impl Iterator for TreeWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            if !self.cancelled && self.cancel.load(Ordering::Relaxed) {
                debug!(root = %self.root.display(), "walk cancelled");
                self.cancelled = true;
                self.stack.clear();
            }

            let top = self.stack.last_mut()?;
            if let Some(child) = top.subdirs.pop() {
                let depth = top.depth + 1;
                self.descend(child, depth);
                continue;
            }

            let frame = self.stack.pop()?;
            return Some(WalkEvent::Entry(self.finish(frame)));
        }
    }
}

fn file_entry(path: &Path, parent: &Path, depth: u32, size: u64) -> Entry {
    Entry {
        path: path_key(path).into_owned(),
        name: base_name(path),
        size,
        file_count: 1,
        dir_count: 0,
        depth,
        parent_path: Some(path_key(parent).into_owned()),
        is_dir: false,
    }
}
