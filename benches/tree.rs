use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use iradix::Tree;

fn random_keys(count: usize) -> Vec<[u8; 16]> {
    let mut rng = StdRng::seed_from_u64(0xda7a);
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let mut key = [0u8; 16];
        rng.fill_bytes(&mut key);
        keys.push(key);
    }
    keys
}

fn build(keys: &[[u8; 16]]) -> Tree<u64> {
    let tree = Tree::new();
    let mut txn = tree.txn();
    for (i, key) in keys.iter().enumerate() {
        txn.insert(key, i as u64);
    }
    txn.commit()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for count in [1_000usize, 10_000] {
        let keys = random_keys(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("txn_batch", count), &keys, |b, keys| {
            b.iter(|| build(black_box(keys)));
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let keys = random_keys(10_000);
    let tree = build(&keys);
    c.bench_function("get", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            black_box(tree.get(black_box(key)))
        });
    });
}

fn bench_iterate(c: &mut Criterion) {
    let keys = random_keys(10_000);
    let tree = build(&keys);
    c.bench_function("iterate_all", |b| {
        b.iter(|| {
            let mut leaves = 0usize;
            for entry in black_box(&tree) {
                black_box(entry);
                leaves += 1;
            }
            leaves
        });
    });
}

fn bench_seek_lower_bound(c: &mut Criterion) {
    let keys = random_keys(10_000);
    let tree = build(&keys);
    c.bench_function("seek_lower_bound", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            let mut iter = tree.root().iter();
            iter.seek_lower_bound(black_box(key));
            black_box(iter.next())
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_iterate,
    bench_seek_lower_bound
);
criterion_main!(benches);
