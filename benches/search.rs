//! Benchmarks for index build and nearest-neighbor search.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use vicinity::index::{KdTree, SpatialIndex};
use vicinity::Vector;

/// Deterministic pseudo-random points on a low-discrepancy lattice.
fn make_vectors(n: usize, dims: usize) -> Vec<Vector> {
    (0..n)
        .map(|i| {
            let values = (0..dims)
                .map(|d| ((i * 2654435761 + d * 40503) % 10_000) as f32 / 100.0)
                .collect();
            Vector::new(values)
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("kd_tree_build");
    for &n in &[1_000usize, 10_000] {
        let vectors = make_vectors(n, 8);
        group.bench_with_input(BenchmarkId::from_parameter(n), &vectors, |b, vectors| {
            b.iter(|| {
                let mut tree = KdTree::new();
                tree.build(black_box(vectors));
                black_box(tree.node_count())
            });
        });
    }
    group.finish();
}

fn bench_nearest(c: &mut Criterion) {
    let vectors = make_vectors(10_000, 8);
    let mut tree = KdTree::new();
    tree.build(&vectors);
    let query = Vector::new(vec![37.0, 12.0, 88.0, 5.0, 61.0, 23.0, 44.0, 9.0]);

    c.bench_function("kd_tree_nearest_10_of_10k", |b| {
        b.iter(|| tree.nearest(black_box(&query), 10).unwrap());
    });
}

criterion_group!(benches, bench_build, bench_nearest);
criterion_main!(benches);
