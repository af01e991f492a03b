//! Frame-budget read benchmarks
//!
//! Every foreground read should finish well inside 16 ms:
//! - cached render lookup
//! - statistics on a 10 KB note
//! - search over 10,000 indexed records
//! - columnar row fetch

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use framestore_core::{Category, Record};
use framestore_engine::{Coordinator, EngineConfig};
use std::hint::black_box;
use tempfile::TempDir;

fn setup(records: usize) -> (Coordinator, TempDir, Vec<Record>) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.render.disk_tier = false;
    config.storage.sync_writes = false;
    let engine = Coordinator::open_with_config(temp_dir.path(), config).unwrap();
    let corpus: Vec<Record> = (0..records)
        .map(|i| {
            Record::new(
                format!("note {i}"),
                format!("latency budget item {i} with performance notes and cache warmup"),
                Category::ALL[i % Category::ALL.len()],
            )
        })
        .collect();
    engine.ingest(corpus.clone()).unwrap().wait();
    (engine, temp_dir, corpus)
}

fn bench_reads(c: &mut Criterion) {
    let (engine, _temp, corpus) = setup(10_000);
    let note = "word ".repeat(2_000);
    engine.get_rendered_output("# cached heading");

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Elements(1));

    group.bench_function("render_hit", |b| {
        b.iter(|| black_box(engine.get_rendered_output("# cached heading")))
    });
    group.bench_function("stats_10kb", |b| {
        b.iter(|| black_box(engine.get_text_stats(&note)))
    });
    group.bench_function("search_10k", |b| {
        b.iter(|| black_box(engine.search("performance", &corpus)))
    });
    group.bench_function("fetch_row", |b| {
        b.iter(|| black_box(engine.fetch_row(5_000)))
    });
    group.finish();
}

fn bench_log_update(c: &mut Criterion) {
    let (engine, _temp, corpus) = setup(10);
    let record = corpus[0].id;
    let mut n = 0u64;

    let mut group = c.benchmark_group("wal");
    group.throughput(Throughput::Elements(1));
    group.bench_function("append", |b| {
        b.iter(|| {
            n += 1;
            engine
                .log_update(framestore_core::FieldUpdate::new(
                    record,
                    framestore_core::FieldName::ViewCount,
                    n - 1,
                    n,
                ))
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_reads, bench_log_update);
criterion_main!(benches);
