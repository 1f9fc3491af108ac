// Criterion benchmarks for streamadmin-common protocol layer
//
// Run benchmarks with:
//   cargo bench -p streamadmin-common

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use streamadmin_common::protocol::jsonrpc::JsonRpcError;
use streamadmin_common::transport::HttpTransport;
use streamadmin_common::{
    methods, PartitionEntry, PartitionTimestamp, ProducerError, TopicRequest, TopicResponse,
    DATAPORT_ENDPOINT_TYPE, DEFAULT_POOL_NAME, MAINT_TOPIC, NUM_PARTITIONS,
};

fn full_timestamp(bucket: &str) -> PartitionTimestamp {
    let mut ts = PartitionTimestamp::with_capacity(DEFAULT_POOL_NAME, bucket, NUM_PARTITIONS as usize);
    for p in 0..NUM_PARTITIONS {
        ts.append(PartitionEntry::new(p, p as u64 * 10, 0xbeef, 0, p as u64 * 10))
            .unwrap();
    }
    ts
}

fn bench_timestamp_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("timestamp_build");

    group.bench_function("append_1024_partitions", |b| {
        b.iter(|| full_timestamp(black_box("default")));
    });

    group.finish();
}

fn bench_topic_request_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_request_serialization");

    let request = TopicRequest {
        topic: MAINT_TOPIC.to_string(),
        endpoint_type: DATAPORT_ENDPOINT_TYPE.to_string(),
        timestamps: vec![full_timestamp("default")],
        instances: Vec::new(),
    };

    group.bench_function("serialize_full_bucket", |b| {
        b.iter(|| {
            let params = serde_json::to_value(black_box(&request)).unwrap();
            HttpTransport::build_request(methods::MUTATION_TOPIC_REQUEST, params, json!(1))
        });
    });

    let encoded = serde_json::to_vec(&request).unwrap();
    group.bench_function("deserialize_full_bucket", |b| {
        b.iter(|| serde_json::from_slice::<TopicRequest>(black_box(&encoded)).unwrap());
    });

    group.finish();
}

fn bench_producer_error_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("producer_error_decode");

    let response = TopicResponse::default().with_rollback(vec![full_timestamp("default")]);
    let error = JsonRpcError::producer(&ProducerError::InvalidPartitionBranch, Some(&response));

    group.bench_function("rollback_payload", |b| {
        b.iter(|| black_box(error.clone()).into_producer_failure());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_timestamp_build,
    bench_topic_request_serialization,
    bench_producer_error_decode
);
criterion_main!(benches);
