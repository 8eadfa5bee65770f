//! Benchmarks for the distributed compilation pipeline
//!
//! Run with: cargo bench -p qdist-compile

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use qdist_compile::{CrossNodeRuns, PassManagerBuilder};
use qdist_ir::{Circuit, Gate, NodeId, Operation, QubitId};

/// Ring of `nodes` nodes with `width` qubits each and one cross-node CX
/// layer per qubit index between neighbours.
fn ring(nodes: usize, width: usize) -> Circuit {
    let node = |i: usize| NodeId::new(format!("QPU_{i}"));
    let qubit = |i: usize, j: usize| QubitId::new(format!("q_{i}_{j}"));

    let mut circuit = Circuit::with_qubit_map(
        (0..nodes).map(|i| (node(i), (0..width).map(|j| qubit(i, j)).collect())),
    )
    .unwrap();
    for j in 0..width {
        for i in 0..nodes {
            let next = (i + 1) % nodes;
            circuit
                .push_operations([Operation::cross_node(
                    node(i),
                    node(next),
                    qubit(i, 0),
                    qubit(next, j),
                    Gate::CX,
                )
                .unwrap()])
                .unwrap();
        }
    }
    circuit
}

fn bench_run_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_analysis");
    for nodes in &[2, 4, 8, 16] {
        let circuit = ring(*nodes, 4);
        group.bench_with_input(BenchmarkId::new("ring", nodes), &circuit, |b, circuit| {
            b.iter(|| CrossNodeRuns::new().analyze(black_box(circuit)).unwrap());
        });
    }
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    for nodes in &[2, 4, 8] {
        let circuit = ring(*nodes, 4);
        group.bench_with_input(BenchmarkId::new("merged", nodes), &circuit, |b, circuit| {
            b.iter(|| {
                let (pm, mut props) = PassManagerBuilder::new().build();
                pm.run(black_box(circuit), &mut props).unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("unmerged", nodes), &circuit, |b, circuit| {
            b.iter(|| {
                let (pm, mut props) = PassManagerBuilder::new().with_run_merging(false).build();
                pm.run(black_box(circuit), &mut props).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_run_analysis, bench_full_pipeline);
criterion_main!(benches);
