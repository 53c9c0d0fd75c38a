//! # Engine Benchmarks
//!
//! Brute-force vector search and graph analytics.
//!
//! Run with: `cargo bench -p weft-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use weft_core::{Embedding, GraphEngine, Node, NodeKind, Store};

const DIMENSIONS: usize = 384;

/// Deterministic pseudo-random unit vector.
fn vector(seed: u64) -> Embedding {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let raw: Vec<f32> = (0..DIMENSIONS)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
        })
        .collect();
    Embedding::normalized(&raw).expect("unit")
}

/// Clusters of ten densely linked nodes, joined in a ring.
fn clustered_graph(size: usize) -> GraphEngine {
    let mut graph = GraphEngine::new();
    for i in 0..size {
        let cluster = i / 10;
        for j in (cluster * 10)..i {
            if (i + j) % 3 != 0 {
                graph.add_edge(&format!("n{i}"), &format!("n{j}"));
            }
        }
    }
    let clusters = size.div_ceil(10);
    for c in 0..clusters {
        let next = (c + 1) % clusters;
        graph.add_edge(&format!("n{}", c * 10), &format!("n{}", next * 10));
    }
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_vector_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_search");

    for size in [100usize, 1000, 5000] {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("bench.redb"), Duration::from_secs(1)).expect("open");
        let mut batch = store.begin_batch().expect("batch");
        for i in 0..size {
            let node = Node::new(format!("n{i}"), NodeKind::Document, format!("N{i}"))
                .with_embedding(vector(i as u64));
            batch.upsert_node(&node).expect("node");
        }
        batch.commit().expect("commit");
        let query = vector(u64::MAX);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(store.find_similar_by_vector(query.as_slice(), 10).expect("search")));
        });
    }

    group.finish();
}

fn bench_communities(c: &mut Criterion) {
    let mut group = c.benchmark_group("communities");

    for size in [100usize, 1000] {
        let graph = clustered_graph(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(graph.communities(1.0)));
        });
    }

    group.finish();
}

fn bench_structural_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural_candidates");

    for size in [100usize, 500] {
        let graph = clustered_graph(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(graph.find_structural_candidates(20)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_vector_search,
    bench_communities,
    bench_structural_candidates,
);

criterion_main!(benches);
