//! Text index integration tests
//!
//! Validates recall, fuzzy matching, determinism and that searches running
//! during a rebuild never observe a partially merged index.

use framestore_core::{Category, Record};
use framestore_search::{IndexConfig, StatsComputer, TextIndexer};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

// ============================================================================
// Test Helpers
// ============================================================================

fn corpus(n: usize, marker: &str) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new(
                format!("entry {i}"),
                format!("filler text number {i} with the {marker} keyword inside"),
                Category::ALL[i % Category::ALL.len()],
            )
        })
        .collect()
}

// ============================================================================
// Recall
// ============================================================================

#[test]
fn test_recall_floor_every_match_returned() {
    let records = corpus(2_000, "zebra");
    let index = TextIndexer::new(IndexConfig {
        batch_size: 128,
        ..IndexConfig::default()
    });
    index.build_index(&records);

    let results = index.search("zebra", &records);
    assert_eq!(results.len(), records.len());
    assert!(results.iter().all(|r| r.score > 0.0));
}

#[test]
fn test_fuzzy_scenario() {
    let records = vec![
        Record::new("Benchmarks", "render performance regressed", Category::Note),
        Record::new("Recipes", "flour sugar butter", Category::Note),
    ];
    let index = TextIndexer::default();
    index.build_index(&records);

    let results = index.search("performnace", &records);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record_id, records[0].id);
    assert!(results[0].score > 0.0);
}

#[test]
fn test_search_is_deterministic() {
    let records = corpus(300, "apple");
    let index = TextIndexer::default();
    index.build_index(&records);
    let first = index.search("apple keyword", &records);
    for _ in 0..5 {
        assert_eq!(index.search("apple keyword", &records), first);
    }
}

#[test]
fn test_highlights_point_at_matches() {
    let records = vec![Record::new("Latency notes", "latency spikes at startup", Category::Note)];
    let index = TextIndexer::default();
    index.build_index(&records);

    let results = index.search("latency", &records);
    assert_eq!(results[0].highlights, vec![(0, 7), (14, 21)]);
}

// ============================================================================
// Snapshot swap
// ============================================================================

#[test]
fn test_concurrent_search_sees_whole_snapshots() {
    let old = corpus(1_000, "oldword");
    let new = corpus(1_000, "newword");
    let index = Arc::new(TextIndexer::new(IndexConfig {
        batch_size: 64,
        ..IndexConfig::default()
    }));
    index.build_index(&old);

    let mut all = old.clone();
    all.extend(new.iter().cloned());
    let all = Arc::new(all);

    let reader = {
        let index = Arc::clone(&index);
        let all = Arc::clone(&all);
        thread::spawn(move || {
            for _ in 0..50 {
                let n = index.search("oldword", &all).len();
                assert!(n == 0 || n == 1_000, "observed partial index: {n}");
            }
        })
    };
    for _ in 0..5 {
        index.build_index(&new);
        index.build_index(&old);
    }
    reader.join().unwrap();
}

#[test]
fn test_compaction_keeps_common_terms() {
    let records = corpus(100, "shared");
    let index = TextIndexer::default();
    index.build_index(&records);

    let report = index.compact_index();
    assert!(report.removed_terms > 0);
    assert_eq!(index.search("shared", &records).len(), 100);
}

#[test]
fn test_stats_cache_shared_across_threads() {
    let computer = Arc::new(StatsComputer::default());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let computer = Arc::clone(&computer);
            thread::spawn(move || computer.compute_text("one two three. four five!"))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].word_count, 5);
    assert_eq!(computer.cache_len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_scores_positive_and_sorted(words in proptest::collection::vec("[a-z]{3,8}", 1..30), query in "[a-z]{3,8}") {
        let records: Vec<Record> = words
            .chunks(3)
            .map(|c| Record::new("doc", c.join(" "), Category::Note))
            .collect();
        let index = TextIndexer::default();
        index.build_index(&records);
        let results = index.search(&query, &records);
        prop_assert!(results.iter().all(|r| r.score > 0.0));
        prop_assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
