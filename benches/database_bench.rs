// Snapshot store benchmarks

use criterion::async_executor::AsyncExecutor;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tokio::runtime::Runtime;

mod common;

struct TokioExecutor(Runtime);

impl AsyncExecutor for TokioExecutor {
    fn block_on<T>(&self, future: impl std::future::Future<Output = T>) -> T {
        self.0.block_on(future)
    }
}

fn bench_append_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("db_append_entries");
    for size in [1_000, 10_000, 50_000] {
        let entries = common::generate_entries(size, 1);

        group.bench_with_input(BenchmarkId::new("entries", size), &entries, |b, entries| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| async {
                let db = common::setup_bench_db().await;
                let id = db.begin_snapshot("/srv").await.unwrap();
                db.append_entries(id, entries).await.unwrap();
                black_box(id)
            });
        });
    }
    group.finish();
}

fn bench_growth_between(c: &mut Criterion) {
    let mut group = c.benchmark_group("db_growth_between");
    for size in [1_000, 10_000, 50_000] {
        let earlier = common::generate_entries(size, 1);
        let later = common::generate_entries(size, 2);

        group.bench_with_input(BenchmarkId::new("entries", size), &size, |b, _| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| {
                let earlier = earlier.clone();
                let later = later.clone();
                async move {
                    let db = common::setup_bench_db().await;
                    let a = common::store_snapshot(&db, 1_000, &earlier).await;
                    let b = common::store_snapshot(&db, 2_000, &later).await;
                    black_box(db.growth_between(a, b, 20, false, 0).await.unwrap())
                }
            });
        });
    }
    group.finish();
}

fn bench_browse(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let entries = common::generate_entries(50_000, 1);
    let (db, id) = runtime.block_on(async {
        let db = common::setup_bench_db().await;
        let id = common::store_snapshot(&db, 1_000, &entries).await;
        (db, id)
    });

    c.bench_function("db_browse", |b| {
        // Same runtime that opened the pool
        b.to_async(&runtime)
            .iter(|| async { black_box(db.browse(id, "/srv/group_42").await.unwrap()) });
    });
}

criterion_group!(benches, bench_append_entries, bench_growth_between, bench_browse);
criterion_main!(benches);
