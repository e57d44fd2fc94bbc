//! Insert and point-lookup throughput over a disk-backed tree.
//!
//! ```bash
//! cargo bench --bench engine
//! cargo bench --bench engine -- insert
//! ```

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rivetdb::{BTree, Pager, Row};
use tempfile::TempDir;

const INSERT_ROWS: u32 = 1_000;
const LOOKUP_KEYS: u32 = 10_000;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(u64::from(INSERT_ROWS)));

    group.bench_function("sequential_1k", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |dir| {
                let mut pager = Pager::open(dir.path().join("bench.db")).unwrap();
                {
                    let mut tree = BTree::new(&mut pager).unwrap();
                    for id in 0..INSERT_ROWS {
                        let row = Row::new(id, "bench_user", "bench@example.com").unwrap();
                        tree.insert(&row).unwrap();
                    }
                }
                pager.close().unwrap();
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("reverse_1k", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |dir| {
                let mut pager = Pager::open(dir.path().join("bench.db")).unwrap();
                {
                    let mut tree = BTree::new(&mut pager).unwrap();
                    for id in (0..INSERT_ROWS).rev() {
                        let row = Row::new(id, "bench_user", "bench@example.com").unwrap();
                        tree.insert(&row).unwrap();
                    }
                }
                pager.close().unwrap();
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::open(dir.path().join("bench.db")).unwrap();
    let mut tree = BTree::new(&mut pager).unwrap();
    for id in 0..LOOKUP_KEYS {
        let row = Row::new(id, "bench_user", "bench@example.com").unwrap();
        tree.insert(&row).unwrap();
    }

    let mut group = c.benchmark_group("lookup");

    let mut next = 0u32;
    group.bench_function("hit", |b| {
        b.iter(|| {
            next = (next + 7919) % LOOKUP_KEYS;
            black_box(tree.find_row(black_box(next)).unwrap())
        })
    });

    group.bench_function("bloom_negative", |b| {
        b.iter(|| {
            next = next.wrapping_add(7919);
            black_box(tree.find_row(black_box(LOOKUP_KEYS + 1 + next)).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup);
criterion_main!(benches);
