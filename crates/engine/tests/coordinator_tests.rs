//! Coordinator integration tests
//!
//! Foreground reads racing background work, in-flight render deduplication,
//! superseded prefetches, the render disk tier across restarts and recovery
//! from memory pressure.

use framestore_core::{Category, Error, Record, Result};
use framestore_engine::{Coordinator, EngineConfig, MarkdownRenderer, Renderer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scheduler.worker_threads = 2;
    config.storage.sync_writes = false;
    config.render.inline_render_bytes = 32;
    config
}

/// Counts calls and sleeps, so background renders stay in flight a while.
struct SlowRenderer {
    calls: AtomicUsize,
    delay: Duration,
}

impl Renderer for SlowRenderer {
    fn render(&self, source: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        MarkdownRenderer.render(source)
    }
}

struct FailingRenderer;

impl Renderer for FailingRenderer {
    fn render(&self, _source: &str) -> Result<String> {
        Err(Error::encoding("renderer unavailable"))
    }
}

#[test]
fn test_repeated_placeholder_requests_render_once() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(SlowRenderer {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(50),
    });
    let engine =
        Coordinator::open_with_renderer(dir.path(), config(), renderer.clone()).unwrap();

    let text = "a long paragraph that is well past the inline limit";
    for _ in 0..10 {
        assert!(engine.get_rendered_output(text).is_placeholder);
    }
    engine.wait_for_background();

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    assert!(!engine.get_rendered_output(text).is_placeholder);
    assert_eq!(engine.metrics().render_placeholders, 10);
}

#[test]
fn test_failed_render_falls_back_to_placeholder() {
    let dir = TempDir::new().unwrap();
    let engine =
        Coordinator::open_with_renderer(dir.path(), config(), Arc::new(FailingRenderer)).unwrap();

    let out = engine.get_rendered_output("short");
    assert!(out.is_placeholder);
    assert_eq!(out.content, "short");
    // Nothing cached, so the next call tries again.
    assert!(engine.get_rendered_output("short").is_placeholder);
    assert_eq!(engine.render_stats().entries, 0);
}

#[test]
fn test_reads_run_while_ingest_is_in_progress() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(Coordinator::open_with_config(dir.path(), config()).unwrap());
    let records: Vec<Record> = (0..3_000)
        .map(|i| Record::new(format!("t{i}"), format!("body {i} needle"), Category::Note))
        .collect();
    let handles = engine.ingest(records.clone()).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let records = records.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let n = engine.search("needle", &records).len();
                    assert!(n == 0 || n == records.len(), "partial index: {n}");
                    engine.get_text_stats("quick read");
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }
    handles.wait();
    assert_eq!(engine.search("needle", &records).len(), 3_000);
}

#[test]
fn test_new_prefetch_cancels_previous() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.scheduler.worker_threads = 1;
    let renderer = Arc::new(SlowRenderer {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(20),
    });
    let engine = Coordinator::open_with_renderer(dir.path(), config, renderer).unwrap();

    // Occupy the only worker so both prefetches queue up behind it.
    let long = "x".repeat(100);
    engine.get_rendered_output(&long);

    let stale: Vec<Record> = (0..5)
        .map(|i| Record::new("stale", format!("stale {i}"), Category::Note))
        .collect();
    let fresh: Vec<Record> = (0..5)
        .map(|i| Record::new("fresh", format!("fresh {i}"), Category::Note))
        .collect();
    let first = engine.prefetch(&stale).unwrap();
    let second = engine.prefetch(&fresh).unwrap();
    second.wait();
    first.wait();

    assert!(first.is_cancelled());
    let misses = engine.metrics().render_misses;
    for record in &fresh {
        engine.render_record(record);
    }
    assert_eq!(engine.metrics().render_misses, misses);
}

#[test]
fn test_render_disk_tier_survives_restart() {
    let dir = TempDir::new().unwrap();
    let text = "# Persisted heading";
    {
        let engine = Coordinator::open_with_config(dir.path(), config()).unwrap();
        engine.get_rendered_output(text);
        engine.shutdown().unwrap();
    }
    let engine = Coordinator::open(dir.path()).unwrap();
    let out = engine.get_rendered_output(text);
    assert_eq!(out.content, "<h1>Persisted heading</h1>\n");
    assert_eq!(engine.render_stats().disk_hits, 1);
    assert_eq!(engine.metrics().render_hits, 1);
}

#[test]
fn test_capacity_recovers_after_repeated_pressure() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.render.capacity = 16;
    config.wal.maintenance_interval_ms = 20;
    let engine = Coordinator::open_with_config(dir.path(), config).unwrap();
    let texts: Vec<String> = (0..16).map(|i| format!("item {i}")).collect();

    for _ in 0..3 {
        for text in &texts {
            engine.get_rendered_output(text);
        }
        let report = engine.handle_memory_pressure();
        assert!(report.render_evicted > 0);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.render_stats().capacity < 16 {
        assert!(Instant::now() < deadline, "render capacity never restored");
        thread::sleep(Duration::from_millis(10));
    }

    for text in &texts {
        engine.get_rendered_output(text);
    }
    let hot_before = engine.render_stats().hot_hits;
    for text in &texts {
        assert!(!engine.get_rendered_output(text).is_placeholder);
    }
    let stats = engine.render_stats();
    assert_eq!(stats.hot_hits, hot_before + 16);
    assert_eq!(stats.entries, 16);
}

#[test]
fn test_ingest_is_rejected_whole_when_queue_is_short() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.scheduler.max_queue_depth = 3;
    let engine = Coordinator::open_with_config(dir.path(), config).unwrap();
    let records = vec![Record::new("title", "body text", Category::Note)];

    let err = engine.ingest(records.clone()).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)));
    assert_eq!(engine.scheduler_stats().queue_depth, 0);

    engine.wait_for_background();
    assert_eq!(engine.row_count(), 0);
    assert!(engine.search("body", &records).is_empty());
}
