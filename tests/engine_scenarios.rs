//! End-to-end engine scenarios
//!
//! Each test drives the public Coordinator surface the way the UI layer does:
//! - Deduplication of repeated content
//! - Update log latency, ordering and restart replay
//! - Columnar fetch on a large projection
//! - Fuzzy search
//! - Render cache coherence and eviction under memory pressure

use framestore::{
    Category, Coordinator, EngineConfig, FieldName, FieldUpdate, FieldValue, Record, RecordId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scheduler.worker_threads = 2;
    config.storage.sync_writes = false;
    config.wal.maintenance_interval_ms = 50;
    config
}

fn open(dir: &TempDir) -> Coordinator {
    Coordinator::open_with_config(dir.path(), test_config()).unwrap()
}

// ============================================================================
// Deduplication
// ============================================================================

#[test]
fn scenario_dedup_hello_world_three_times() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);

    let refs: Vec<_> = (0..3)
        .map(|_| engine.deduplicate_content("hello world").unwrap())
        .collect();
    assert!(refs.windows(2).all(|w| w[0].hash == w[1].hash));
    assert_eq!(refs[2].reference_count, 3);

    let stats = engine.storage_stats();
    assert_eq!(stats.unique_objects, 1);
    assert_eq!(stats.total_references, 3);
    assert!((stats.deduplication_ratio - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(engine.retrieve_content(&refs[0]).unwrap(), "hello world");
    assert_eq!(engine.release_content(&refs[0]).unwrap(), 2);
}

#[test]
fn scenario_content_round_trip_large_and_unicode() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    for text in [
        String::new(),
        "naïve café 日本語 🚀".to_string(),
        "lorem ipsum dolor sit amet ".repeat(100_000),
    ] {
        let reference = engine.deduplicate_content(&text).unwrap();
        assert_eq!(reference.size, text.len() as u64);
        assert_eq!(engine.retrieve_content(&reference).unwrap(), text);
    }
}

// ============================================================================
// Update log
// ============================================================================

#[test]
fn scenario_wal_latency_and_order() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.subscribe(move |entry| sink.lock().push(entry.update.new_value.clone()));

    let record = RecordId::new();
    let mut slow = 0;
    let started = Instant::now();
    for n in 0..100u64 {
        let call = Instant::now();
        engine
            .log_update(FieldUpdate::new(record, FieldName::ViewCount, n, n + 1))
            .unwrap();
        if call.elapsed() > Duration::from_millis(1) {
            slow += 1;
        }
    }
    // Average well under a millisecond; tolerate scheduler hiccups.
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(slow <= 5, "{slow} appends exceeded 1ms");

    let expected: Vec<FieldValue> = (1..=100u64).map(FieldValue::from).collect();
    assert_eq!(*seen.lock(), expected);
    assert_eq!(engine.uncommitted_updates(&record).len(), 100);
}

#[test]
fn scenario_uncommitted_updates_survive_restart() {
    let dir = TempDir::new().unwrap();
    let record = RecordId::new();
    let tokens = {
        let engine = open(&dir);
        let tokens: Vec<_> = (0..4u64)
            .map(|n| {
                engine
                    .log_update(FieldUpdate::new(record, FieldName::CopyCount, n, n + 1))
                    .unwrap()
            })
            .collect();
        engine.mark_committed(&tokens[..2]).unwrap();
        engine.checkpoint().unwrap();
        engine.shutdown().unwrap();
        tokens
    };

    let engine = open(&dir);
    let pending = engine.uncommitted_updates(&record);
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].new_value, FieldValue::from(3u64));
    assert_eq!(pending[1].new_value, FieldValue::from(4u64));

    // Tokens stay valid across the restart.
    assert_eq!(engine.mark_committed(&tokens[2..]).unwrap(), 2);
    assert!(engine.uncommitted_updates(&record).is_empty());
}

// ============================================================================
// Columnar projection
// ============================================================================

#[test]
fn scenario_columnar_fetch_10k_rows() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let records: Vec<Record> = (0..10_000)
        .map(|i| Record::new(format!("title {i}"), format!("content {i}"), Category::Note))
        .collect();
    engine.ingest(records.clone()).unwrap().wait();

    let row = engine.row_of(&records[5000].id).unwrap();
    let started = Instant::now();
    let fetched = engine.fetch_row(row).unwrap();
    assert!(started.elapsed() < Duration::from_millis(16));
    assert_eq!(fetched.id, records[5000].id);
    assert_eq!(fetched.title, "title 5000");
    assert_eq!(fetched.content, "content 5000");
    assert_eq!(engine.filter_by_category(Category::Note).len(), 10_000);
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn scenario_fuzzy_search_finds_misspelling() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let records = vec![
        Record::new("Profiling", "render performance dropped after the update", Category::Note),
        Record::new("Groceries", "milk eggs bread", Category::Checklist),
    ];
    engine.ingest(records.clone()).unwrap().wait();

    let results = engine.search("performnace", &records);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record_id, records[0].id);
    assert!(results[0].score > 0.0);
    assert_eq!(engine.metrics().searches, 1);
}

#[test]
fn scenario_ingest_supersedes_previous_index() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let first = vec![Record::new("a", "alpha", Category::Note)];
    let second = vec![Record::new("b", "beta", Category::Note)];
    engine.ingest(first.clone()).unwrap().wait();
    engine.ingest(second.clone()).unwrap().wait();

    assert!(engine.search("alpha", &first).is_empty());
    assert_eq!(engine.search("beta", &second).len(), 1);
    assert_eq!(engine.row_count(), 1);
}

// ============================================================================
// Render cache
// ============================================================================

#[test]
fn scenario_cache_coherence_and_pressure() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config();
    config.render.capacity = 10;
    let engine = Coordinator::open_with_config(dir.path(), config).unwrap();

    let texts: Vec<String> = (0..10).map(|i| format!("## Section {i}")).collect();
    for text in &texts {
        let out = engine.get_rendered_output(text);
        assert!(!out.is_placeholder);
        assert_eq!(engine.get_rendered_output(text), out);
    }
    assert_eq!(engine.render_stats().entries, 10);

    let report = engine.handle_memory_pressure();
    assert_eq!(report.render_evicted, 5);
    assert!(engine.render_stats().entries <= 5);

    // The most recently used half is still served from cache.
    let hits_before = engine.metrics().render_hits;
    engine.get_rendered_output(&texts[9]);
    assert_eq!(engine.metrics().render_hits, hits_before + 1);

    // The evicted half left the disk tier too, so it renders again instead
    // of being promoted back.
    let misses_before = engine.metrics().render_misses;
    let disk_hits_before = engine.render_stats().disk_hits;
    for text in &texts[..5] {
        assert!(!engine.get_rendered_output(text).is_placeholder);
    }
    assert_eq!(engine.metrics().render_misses, misses_before + 5);
    assert_eq!(engine.render_stats().disk_hits, disk_hits_before);
}

#[test]
fn scenario_prefetch_warms_cache() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir);
    let window: Vec<Record> = (0..20)
        .map(|i| Record::new(format!("row {i}"), format!("- item {i}"), Category::Checklist))
        .collect();
    engine.prefetch(&window).unwrap().wait();

    let misses = engine.metrics().render_misses;
    for record in &window {
        assert!(!engine.render_record(record).is_placeholder);
    }
    assert_eq!(engine.metrics().render_misses, misses);
}
