use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use clustertop::decode::binary::encode;
use clustertop::decode::{BinaryDecoder, Decode, JsonDecoder};
use clustertop::project::{self, ColumnSet};
use clustertop::snapshot::{MetricSnapshot, NodeId, SnapshotSet};

const METRICS: [&str; 10] = [
    "node.peers",
    "node.conns",
    "go.procs",
    "go.count",
    "heap.inuse",
    "heap.sys",
    "gc.sys",
    "gc.cpu",
    "send.pub",
    "rcv.pub",
];

fn node_metrics(seed: i64) -> Vec<MetricSnapshot> {
    METRICS
        .iter()
        .enumerate()
        .map(|(i, name)| MetricSnapshot {
            name: name.to_string(),
            label: String::new(),
            t0: 1_700_000_000_000_000_000,
            t1: 1_700_000_005_000_000_000,
            amount: 64,
            sample: (0..64).map(|s| seed * 31 + i as i64 * 7 + s).collect(),
        })
        .collect()
}

fn json_payload(seed: i64) -> Vec<u8> {
    let metrics: Vec<String> = node_metrics(seed)
        .iter()
        .map(|m| {
            let sample: Vec<String> = m.sample.iter().map(i64::to_string).collect();
            format!(
                r#"{{"name":"{}","t0":{},"t1":{},"amount":{},"sample":[{}]}}"#,
                m.name,
                m.t0,
                m.t1,
                m.amount,
                sample.join(",")
            )
        })
        .collect();
    format!(r#"{{"node":"node-{seed}","metrics":[{}]}}"#, metrics.join(",")).into_bytes()
}

fn bench_decode(c: &mut Criterion) {
    let binary = encode(&node_metrics(1));
    let json = json_payload(1);

    c.bench_function("decode/binary_10x64", |b| {
        b.iter(|| BinaryDecoder.decode(black_box(&binary)).expect("decode binary"))
    });

    c.bench_function("decode/json_10x64", |b| {
        b.iter(|| JsonDecoder.decode(black_box(&json)).expect("decode json"))
    });
}

fn bench_project(c: &mut Criterion) {
    let columns = ColumnSet::v1();
    let state: Vec<(NodeId, Arc<SnapshotSet>)> = (0..100)
        .rev()
        .map(|n| {
            (
                NodeId::new(&format!("10.0.{}.{}:9000", n / 250, n % 250)),
                Arc::new(SnapshotSet::new(None, node_metrics(n))),
            )
        })
        .collect();

    c.bench_function("project/v1_100_nodes", |b| {
        b.iter(|| {
            let rows = project::project(black_box(&columns), black_box(&state));
            black_box(rows.len())
        })
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_decode(c);
    bench_project(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
