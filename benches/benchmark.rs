// Merge pipeline benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fedmerge::{
    FederatedMerger, FieldType, MergeOptions, SchemaDefinition, SchemaFieldDescriptor, ShardDocument,
    ShardHit, ShardResponse, ShardSortMergeQueue, SortSpec,
};
use rand::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn generate_shard(name: &str, docs: usize, rng: &mut StdRng) -> ShardResponse {
    let mut scores: Vec<f32> = (0..docs).map(|_| rng.random::<f32>()).collect();
    scores.sort_by(|a, b| b.total_cmp(a));

    let mut response = ShardResponse::new(name);
    for score in scores {
        // ids overlap across shards so fragments join
        let id = rng.random_range(0..docs * 2);
        response = response.with_hit(ShardHit {
            score: Some(score),
            sort_values: Vec::new(),
            fields: [
                ("id".to_string(), json!(id.to_string())),
                ("tag".to_string(), json!([format!("t{}", id % 7), name])),
                ("price".to_string(), json!(id as f64 * 0.5)),
            ]
            .into(),
        });
    }
    response
}

fn generate_shards(shards: usize, docs: usize) -> Vec<ShardResponse> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..shards)
        .map(|i| generate_shard(&format!("shard{}", i), docs, &mut rng))
        .collect()
}

fn benchmark_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    for size in [1000, 10000].iter() {
        let mut rng = StdRng::seed_from_u64(7);
        let docs: Vec<Arc<ShardDocument>> = (0..*size)
            .map(|i| {
                Arc::new(
                    ShardDocument::new(rng.random_range(0..size / 2).to_string(), format!("shard{}", i % 4), i / 4)
                        .with_score(rng.random::<f32>()),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("insert_with_replacement", size), &docs, |b, docs| {
            b.iter(|| {
                let mut queue = ShardSortMergeQueue::new(SortSpec::default(), 100);
                for doc in docs {
                    queue.insert_with_replacement(doc.clone());
                }
                black_box(queue.into_sorted_vec());
            });
        });
    }

    group.finish();
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    let catalog = SchemaDefinition::new("id")
        .field(SchemaFieldDescriptor::string("id"))
        .field(SchemaFieldDescriptor::string("tag").multi_valued())
        .field(SchemaFieldDescriptor::new("price", FieldType::Double))
        .build()
        .unwrap();
    let merger = FederatedMerger::new(Arc::new(catalog));

    for shards in [2, 8].iter() {
        let responses = generate_shards(*shards, 1000);
        let options = MergeOptions::default().with_rows(50).with_fl("*,[shard],score");

        group.bench_with_input(BenchmarkId::new("shards", shards), &responses, |b, responses| {
            b.iter(|| {
                let result = merger.merge(black_box(&options), black_box(responses)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_queue, benchmark_merge);
criterion_main!(benches);
