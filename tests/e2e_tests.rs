// End-to-End tests
// Full pipeline from a directory tree, through scans, to the query facade

mod common;

use disktrend::model::SnapshotStatus;
use disktrend::orchestrator::ScanRequestError;
use disktrend::repository::WriterLock;
use disktrend::service::{DiskTrend, QueryError};
use tempfile::TempDir;

struct Fixture {
    _state: TempDir,
    tree: TempDir,
    app: DiskTrend,
}

impl Fixture {
    fn mount(&self) -> String {
        common::key(self.tree.path())
    }

    fn path(&self, rel: &str) -> String {
        common::key(&self.tree.path().join(rel))
    }

    async fn scan(&self) -> i64 {
        let outcomes = self.app.trigger_scan(None).unwrap().wait().await.unwrap();
        assert_eq!(outcomes[0].status, SnapshotStatus::Completed);
        outcomes[0].snapshot_id
    }
}

async fn fixture() -> Fixture {
    let state = TempDir::new().unwrap();
    let tree = common::create_tree(&[("data/a.bin", 100), ("data/b.bin", 50), ("logs/app.log", 30)]);
    let config = common::test_config(&[tree.path()], state.path().join("db").join("disktrend.db"));
    let app = DiskTrend::open(&config).await.unwrap();
    Fixture { _state: state, tree, app }
}

#[tokio::test]
async fn test_overview_before_first_scan() {
    let fx = fixture().await;

    let overview = fx.app.get_overview().await.unwrap();
    assert!(overview.snapshot.is_none());
    assert!(overview.top_directories.is_empty());

    let status = fx.app.get_status();
    assert!(!status.running);
    assert!(status.progress.is_none());
    assert!(fx.app.top_growth(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scan_then_query() {
    let fx = fixture().await;
    let id = fx.scan().await;

    let snapshot = fx.app.get_snapshot(id).await.unwrap();
    assert_eq!(snapshot.mount_point, fx.mount());
    assert_eq!(snapshot.totals.unwrap().size, 180);

    let listing = fx.app.browse(None, &fx.mount()).await.unwrap();
    assert_eq!(listing.snapshot_id, id);
    assert_eq!(listing.current.size, 180);
    let children: Vec<_> = listing.children.iter().map(|e| (e.name.as_str(), e.size)).collect();
    assert_eq!(children, vec![("data", 150), ("logs", 30)]);

    // Trailing slash and dot segments are normalized away
    let data = fx.app.browse(Some(id), &format!("{}/./data/", fx.mount())).await.unwrap();
    assert_eq!(data.current.path, fx.path("data"));
    assert!(data.children.is_empty());

    let overview = fx.app.get_overview().await.unwrap();
    assert_eq!(overview.snapshot.map(|s| s.id), Some(id));
    assert_eq!(overview.top_directories.len(), 2);
    assert_eq!(overview.top_directories[0].path, fx.path("data"));
    assert!(overview.top_growth.is_empty());

    assert!(fx.app.scan_errors(id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_growth_between_scans() {
    let fx = fixture().await;
    let first = fx.scan().await;
    common::add_files(fx.tree.path(), &[("data/c.bin", 500), ("cache/tmp.bin", 20)]);
    let second = fx.scan().await;

    let growth = fx.app.top_growth(10).await.unwrap();
    let ranked: Vec<_> = growth.iter().map(|r| (r.path.clone(), r.delta)).collect();
    assert_eq!(
        ranked,
        vec![(fx.mount(), 520), (fx.path("data"), 500), (fx.path("cache"), 20)]
    );

    let report = fx
        .app
        .growth_report(Some(&fx.mount()), 10, true, 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((report.earlier.id, report.later.id), (first, second));
    assert!(report.removed.is_empty());

    let history = fx.app.history(&fx.path("data"), 30).await.unwrap();
    let sizes: Vec<_> = history.iter().map(|p| p.size).collect();
    assert_eq!(sizes, vec![150, 650]);

    let snapshots = fx.app.list_snapshots(Some(&fx.mount()), 10).await.unwrap();
    let ids: Vec<_> = snapshots.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![second, first]);
}

#[tokio::test]
async fn test_growth_ranks_directories_with_track_files() {
    let state = TempDir::new().unwrap();
    let tree = common::create_tree(&[("data/a.bin", 100), ("logs/app.log", 10)]);
    let mut config = common::test_config(&[tree.path()], state.path().join("disktrend.db"));
    config.scanner.track_files = true;
    let app = DiskTrend::open(&config).await.unwrap();
    let mount = common::key(tree.path());
    let path = |rel: &str| common::key(&tree.path().join(rel));

    app.trigger_scan(None).unwrap().wait().await.unwrap();
    common::add_files(tree.path(), &[("logs/app.log", 500)]);
    std::fs::remove_file(tree.path().join("data/a.bin")).unwrap();
    app.trigger_scan(None).unwrap().wait().await.unwrap();

    // app.log grew by 490 too, but file rows stay out of the ranking
    let growth = app.top_growth(10).await.unwrap();
    let ranked: Vec<_> = growth.iter().map(|r| (r.path.clone(), r.delta)).collect();
    assert_eq!(ranked, vec![(path("logs"), 490), (mount.clone(), 390)]);

    let report = app.growth_report(Some(&mount), 10, true, 1).await.unwrap().unwrap();
    let ranked: Vec<_> = report.growth.iter().map(|r| r.path.clone()).collect();
    assert_eq!(ranked, vec![path("logs")]);
    // data/a.bin is gone, yet only directories are reported as removed
    assert!(report.removed.is_empty());
}

#[tokio::test]
async fn test_query_errors() {
    let fx = fixture().await;
    let id = fx.scan().await;

    assert!(matches!(fx.app.get_snapshot(id + 100).await, Err(QueryError::NotFound(_))));
    assert!(matches!(fx.app.browse(Some(id), "relative").await, Err(QueryError::InvalidArgument(_))));
    assert!(matches!(
        fx.app.browse(Some(id), &fx.path("nope")).await,
        Err(QueryError::NotFound(_))
    ));
    assert!(matches!(fx.app.history(&fx.mount(), 0).await, Err(QueryError::InvalidArgument(_))));
    assert!(matches!(fx.app.list_snapshots(None, 0).await, Err(QueryError::InvalidArgument(_))));
    assert!(matches!(fx.app.scan_errors(id + 100, 10).await, Err(QueryError::NotFound(_))));

    // Unknown path has no history, which is not an error
    assert!(fx.app.history(&fx.path("nope"), 30).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_browse_running_snapshot_rejected() {
    let fx = fixture().await;
    let running = fx.app.database().begin_snapshot(&fx.mount()).await.unwrap();

    let result = fx.app.browse(Some(running), &fx.mount()).await;
    assert!(matches!(result, Err(QueryError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_reopen_keeps_history_until_next_scan_reconciles() {
    let state = TempDir::new().unwrap();
    let tree = common::create_tree(&[("f", 10)]);
    let config = common::test_config(&[tree.path()], state.path().join("disktrend.db"));

    let (completed, stale) = {
        let app = DiskTrend::open(&config).await.unwrap();
        let outcomes = app.trigger_scan(None).unwrap().wait().await.unwrap();
        // Simulate a crash mid-scan
        let stale = app.database().begin_snapshot(&common::key(tree.path())).await.unwrap();
        (outcomes[0].snapshot_id, stale)
    };

    let app = DiskTrend::open(&config).await.unwrap();
    let snapshots = app.list_snapshots(None, 10).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].id, stale);
    assert_eq!(snapshots[0].status, SnapshotStatus::Running);
    assert_eq!(snapshots[1].id, completed);
    assert_eq!(snapshots[1].status, SnapshotStatus::Completed);

    // The crashed process holds no lock, so the next scan reconciles and runs
    let outcomes = app.trigger_scan(None).unwrap().wait().await.unwrap();
    assert_eq!(outcomes[0].status, SnapshotStatus::Completed);
    assert_eq!(app.get_snapshot(stale).await.unwrap().status, SnapshotStatus::Failed);
}

#[tokio::test]
async fn test_open_leaves_other_process_scan_running() {
    let state = TempDir::new().unwrap();
    let tree = common::create_tree(&[("f", 10)]);
    let db_path = state.path().join("disktrend.db");
    let config = common::test_config(&[tree.path()], db_path.clone());

    // Another process mid-scan: it holds the writer lock and a running row
    let other = DiskTrend::open(&config).await.unwrap();
    let writer = WriterLock::try_acquire(&db_path).unwrap().unwrap();
    let live = other.database().begin_snapshot(&common::key(tree.path())).await.unwrap();

    // A second open, as the CLI would do next to a service, writes nothing
    let app = DiskTrend::open(&config).await.unwrap();
    assert!(app.get_overview().await.unwrap().snapshot.is_none());
    assert_eq!(app.get_snapshot(live).await.unwrap().status, SnapshotStatus::Running);

    assert_eq!(app.trigger_scan(None).err(), Some(ScanRequestError::AlreadyRunning));
    assert!(!app.get_status().running);
    assert_eq!(app.get_snapshot(live).await.unwrap().status, SnapshotStatus::Running);

    // The other process goes away without finishing
    drop(writer);
    let outcomes = app.trigger_scan(None).unwrap().wait().await.unwrap();
    assert_eq!(outcomes[0].status, SnapshotStatus::Completed);
    assert_eq!(app.get_snapshot(live).await.unwrap().status, SnapshotStatus::Failed);
}

#[tokio::test]
async fn test_prune_via_service() {
    let fx = fixture().await;
    fx.scan().await;

    // Everything is younger than a day
    assert_eq!(fx.app.prune(1).await.unwrap(), 0);
    assert_eq!(fx.app.prune(0).await.unwrap(), 0);
    assert_eq!(fx.app.list_snapshots(None, 10).await.unwrap().len(), 1);
    assert!(!fx.app.cancel_scan());
}
