// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use disktrend::config::Config;
use disktrend::model::{Entry, SnapshotStatus, Totals};
use disktrend::repository::Database;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create an in-memory test database with the schema in place
pub async fn create_test_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Create a file database inside `dir`
pub async fn create_db_in_dir(dir: &Path) -> Database {
    let db_path = dir.join("test.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Write files (relative path, size in bytes) under a fresh temp directory
pub fn create_tree(files: &[(&str, usize)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    add_files(dir.path(), files);
    dir
}

pub fn add_files(root: &Path, files: &[(&str, usize)]) {
    for (path, size) in files {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, vec![b'x'; *size]).unwrap();
    }
}

/// Build a directory chain under `root` reaching past PATH_MAX and return the
/// first directory whose absolute path is too long to open, for any user.
///
/// Each half is short enough to create; a rename splices them together.
pub fn create_overlong_dir(root: &Path) -> PathBuf {
    const PATH_MAX: usize = 4096;
    let segment = "d".repeat(200);
    let chain = |base: &Path| (0..12).fold(base.to_path_buf(), |path, _| path.join(&segment));

    let outer = chain(&root.join("deep"));
    fs::create_dir_all(&outer).unwrap();
    let inner = root.join("splice");
    fs::create_dir_all(chain(&inner)).unwrap();
    let mut path = outer.join("splice");
    fs::rename(&inner, &path).unwrap();

    while path.as_os_str().len() < PATH_MAX {
        path = path.join(&segment);
    }
    path
}

pub fn key(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

/// Config scanning only `mounts`, with nothing skipped.
///
/// Temp directories usually live under /tmp, which the default config skips.
pub fn test_config(mounts: &[&Path], db_path: PathBuf) -> Config {
    let mut config = Config::default();
    config.database.path = db_path;
    config.scanner.mount_points = mounts.iter().map(|p| p.to_path_buf()).collect();
    config.scanner.skip_paths = Vec::new();
    config.scanner.flush_interval_ms = 50;
    config.scanner.progress_interval_ms = 0;
    config.retention.days = 0;
    config
}

/// A directory entry as the walker would emit it
pub fn dir_entry(path: &str, parent: Option<&str>, depth: u32, size: u64) -> Entry {
    Entry {
        path: path.to_string(),
        name: path.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("/").to_string(),
        size,
        file_count: 1,
        dir_count: 0,
        depth,
        parent_path: parent.map(str::to_string),
        is_dir: true,
    }
}

/// Store a completed snapshot of `/` holding the given depth-1 directories
pub async fn seed_snapshot(db: &Database, started_at: i64, dirs: &[(&str, u64)]) -> i64 {
    let id = db.begin_snapshot_at("/", started_at).await.unwrap();

    let total: u64 = dirs.iter().map(|(_, size)| size).sum();
    let mut entries: Vec<Entry> = dirs
        .iter()
        .map(|(path, size)| dir_entry(path, Some("/"), 1, *size))
        .collect();
    let mut root = dir_entry("/", None, 0, total);
    root.file_count = dirs.len() as u64;
    root.dir_count = dirs.len() as u64;
    entries.push(root);

    db.append_entries(id, &entries).await.unwrap();
    let totals = Totals { size: total, files: dirs.len() as u64, dirs: dirs.len() as u64 };
    db.finalize_snapshot(id, Some(totals), SnapshotStatus::Completed)
        .await
        .unwrap();
    id
}
