//! Index and storage benchmarks
//!
//! Benchmarks for catalog operations including:
//! - Parsing and serializing indexes of increasing size
//! - Registering a model (load, modify, atomic persist)
//! - Snapshot reads under a populated index

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use devon::ModelMetadata;
use devon::storage::index::{Index, IndexEntry, index_key, parse_index, serialize_index};
use devon::storage::ModelStorage;
use std::hint::black_box;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn build_index(count: usize) -> Index {
    (0..count)
        .map(|i| {
            let model_id = format!("org-{}/model-{}", i % 50, i);
            let metadata = ModelMetadata {
                parameter_count: Some(7),
                format: vec!["safetensors".to_string()],
                tags: vec!["text-generation".to_string(), "llama".to_string()],
                ..ModelMetadata::new("huggingface", &model_id)
            };
            let entry = IndexEntry {
                source: "huggingface".to_string(),
                path: PathBuf::from("/models/huggingface").join(&model_id),
                metadata: metadata.to_persisted(),
                files: vec![
                    "config.json".to_string(),
                    "model-00001-of-00002.safetensors".to_string(),
                    "model-00002-of-00002.safetensors".to_string(),
                ],
                downloaded_at: Utc::now(),
                last_used: None,
                size_bytes: 14 * 1024 * 1024 * 1024,
                unknown: Default::default(),
                model_id,
            };
            (index_key(&entry.source, &entry.model_id), entry)
        })
        .collect()
}

/// Benchmark JSON parse and serialize of the whole catalog
fn bench_index_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_codec");
    let path = Path::new("index.json");

    for count in [10, 100, 1000] {
        let index = build_index(count);
        let content = serialize_index(path, &index).unwrap();

        group.bench_with_input(BenchmarkId::new("serialize", count), &index, |b, index| {
            b.iter(|| serialize_index(path, black_box(index)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("parse", count), &content, |b, content| {
            b.iter(|| parse_index(path, black_box(content)).unwrap());
        });
    }
    group.finish();
}

/// Benchmark register, which reloads and atomically rewrites the index file
fn bench_register(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("register");
    group.sample_size(20);

    for count in [10, 100, 1000] {
        let temp_dir = TempDir::new().unwrap();
        let storage = rt.block_on(async {
            let storage = ModelStorage::open(temp_dir.path().join("models"))
                .await
                .unwrap();
            for (_, entry) in build_index(count) {
                let metadata = ModelMetadata::new(&entry.source, &entry.model_id);
                storage
                    .register(&entry.source, &entry.model_id, &metadata, &[])
                    .await
                    .unwrap();
            }
            storage
        });
        let metadata = ModelMetadata::new("huggingface", "bench/target");

        group.bench_with_input(
            BenchmarkId::new("existing_models", count),
            &storage,
            |b, storage| {
                b.to_async(&rt).iter(|| async {
                    storage
                        .register("huggingface", "bench/target", &metadata, &[])
                        .await
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark snapshot reads
fn bench_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("reads");

    let temp_dir = TempDir::new().unwrap();
    let storage = rt.block_on(async {
        let storage = ModelStorage::open(temp_dir.path().join("models"))
            .await
            .unwrap();
        for (_, entry) in build_index(500) {
            let metadata = ModelMetadata::new(&entry.source, &entry.model_id);
            storage
                .register(&entry.source, &entry.model_id, &metadata, &[])
                .await
                .unwrap();
        }
        storage
    });

    group.bench_function("get_entry", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(storage.get_entry("huggingface", "org-7/model-257").await);
        });
    });
    group.bench_function("list_all", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(storage.list(None).await);
        });
    });
    group.bench_function("stats", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(storage.stats().await);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_index_codec, bench_register, bench_reads);
criterion_main!(benches);
