// Criterion benchmarks for streamadmin-metrics
//
// Run benchmarks with:
//   cargo bench -p streamadmin-metrics

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Instant;
use streamadmin_metrics::{MetricsCollector, StreamAdminMetricsCollector};

fn bench_record_operation(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_operation");

    let collector = StreamAdminMetricsCollector::new();

    group.bench_function("single_operation", |b| {
        b.iter(|| {
            collector.record_operation(black_box("add_index"), black_box(Instant::now()), black_box(true));
        });
    });

    group.bench_function("round_retry", |b| {
        b.iter(|| {
            collector.record_round_retry(black_box("restart"), black_box("inconsistent-topology"));
        });
    });

    group.finish();
}

fn bench_node_requests(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_requests");

    for node_count in [4, 32, 128] {
        let collector = StreamAdminMetricsCollector::new();
        let nodes: Vec<String> = (0..node_count).map(|i| format!("10.0.0.{}:11210", i)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(node_count), &nodes, |b, nodes| {
            b.iter(|| {
                for node in nodes {
                    collector.record_node_request(black_box(node), true);
                }
            });
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    let collector = StreamAdminMetricsCollector::new();
    for op in ["add_index", "delete_index", "repair_endpoint", "restart"] {
        for i in 0..100 {
            collector.record_round(op);
            collector.record_operation(op, Instant::now(), i % 5 != 0);
        }
    }
    for i in 0..64 {
        collector.record_node_request(&format!("10.0.0.{}:11210", i), true);
    }

    group.bench_function("four_operations_64_nodes", |b| {
        b.iter(|| collector.snapshot());
    });

    group.finish();
}

criterion_group!(benches, bench_record_operation, bench_node_requests, bench_snapshot);
criterion_main!(benches);
