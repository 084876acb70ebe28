//! Index benchmarks: inserts, point lookups, range scans and removals over the
//! in-memory provider.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ordex_storage::{
    Index, IndexConfigurationBuilder, KeyRange, MemoryPageProvider, MinMeasure, SumMeasure,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

type BenchIndex = Index<u64, u64, MemoryPageProvider<u64, u64>>;

fn build_index(page_size: usize, keys: &[u64]) -> BenchIndex {
    let configuration = IndexConfigurationBuilder::new(|item: &u64| *item)
        .page_size(page_size)
        .measure(SumMeasure::new("Sum", |v: &u64| *v as i64))
        .measure(MinMeasure::new("Min", |v: &u64| *v as i64))
        .build()
        .unwrap();
    let mut index = Index::create(MemoryPageProvider::new(), configuration).unwrap();
    for &key in keys {
        index.add(key).unwrap();
    }
    index
}

fn shuffled(count: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(42));
    keys
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_insert");

    for count in [1_000u64, 10_000] {
        let random = shuffled(count);
        let sequential: Vec<u64> = (0..count).collect();
        group.throughput(Throughput::Elements(count));

        for page_size in [16usize, 64] {
            group.bench_with_input(
                BenchmarkId::new(format!("sequential/page_{}", page_size), count),
                &sequential,
                |b, keys| b.iter(|| build_index(page_size, keys)),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("random/page_{}", page_size), count),
                &random,
                |b, keys| b.iter(|| build_index(page_size, keys)),
            );
        }
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_get");

    for count in [1_000u64, 10_000] {
        let keys = shuffled(count);
        let index = build_index(64, &keys);

        group.bench_with_input(BenchmarkId::new("existing_key", count), &keys, |b, keys| {
            let mut position = 0;
            b.iter(|| {
                let key = keys[position % keys.len()];
                position += 1;
                black_box(index.get(&key).unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("missing_key", count), &count, |b, &count| {
            b.iter(|| black_box(index.get(&(count + 1)).unwrap()));
        });
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_scan");
    let count = 10_000u64;
    let index = build_index(64, &shuffled(count));
    group.throughput(Throughput::Elements(count));

    group.bench_function("forward_full", |b| {
        b.iter(|| index.iter().unwrap().map(|item| *item.unwrap()).sum::<u64>())
    });
    group.bench_function("backward_half", |b| {
        b.iter(|| {
            index
                .read(KeyRange::closed(count, count / 2))
                .unwrap()
                .count()
        })
    });
    group.bench_function("measure_range", |b| {
        b.iter(|| {
            index
                .measure_range(KeyRange::closed(1_000, 2_000), "Sum")
                .unwrap()
        })
    });

    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_remove");

    for count in [1_000u64, 10_000] {
        let keys = shuffled(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("random", count), &keys, |b, keys| {
            b.iter_with_setup(
                || build_index(64, keys),
                |mut index| {
                    for key in keys {
                        index.remove(key).unwrap();
                    }
                    index
                },
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_get, bench_scan, bench_remove);
criterion_main!(benches);
