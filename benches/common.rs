// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use disktrend::model::{Entry, SnapshotStatus, Totals};
use disktrend::repository::Database;
use std::fs;
use tempfile::TempDir;

/// Create an in-memory database with schema for benchmarking
pub async fn setup_bench_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Build a directory tree `fanout` wide and `depth` deep, with
/// `files_per_dir` small files in every directory
pub fn generate_fs_tree(fanout: usize, depth: usize, files_per_dir: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut level = vec![dir.path().to_path_buf()];
    for _ in 0..depth {
        let mut next = Vec::with_capacity(level.len() * fanout);
        for parent in &level {
            for i in 0..fanout {
                let child = parent.join(format!("d{i}"));
                fs::create_dir(&child).unwrap();
                for f in 0..files_per_dir {
                    fs::write(child.join(format!("f{f}.dat")), vec![0u8; 64 * (f + 1)]).unwrap();
                }
                next.push(child);
            }
        }
        level = next;
    }
    dir
}

/// Synthesize `count` directory entries shaped like a walker's output
pub fn generate_entries(count: usize, scale: u64) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            let parent = format!("/srv/group_{}", i / 100);
            Entry {
                path: format!("{parent}/dir_{i}"),
                name: format!("dir_{i}"),
                size: (i as u64 % 977) * scale,
                file_count: (i % 50) as u64,
                dir_count: 0,
                depth: 3,
                parent_path: Some(parent),
                is_dir: true,
            }
        })
        .collect()
}

/// Store a completed snapshot holding `entries`
pub async fn store_snapshot(db: &Database, started_at: i64, entries: &[Entry]) -> i64 {
    let id = db.begin_snapshot_at("/srv", started_at).await.unwrap();
    db.append_entries(id, entries).await.unwrap();
    db.finalize_snapshot(id, Some(Totals::default()), SnapshotStatus::Completed)
        .await
        .unwrap();
    id
}
