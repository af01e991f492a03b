//! Content-addressable store integration tests
//!
//! - Deduplication idempotence across many stores
//! - Round-trip for empty, multi-megabyte and non-ASCII content
//! - Concurrent stores of identical content
//! - Persistence of counts across reopen
//! - Corrupted object headers surface as errors

use framestore_core::Error;
use framestore_storage::{CasConfig, ContentAddressableStore};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn open(dir: &TempDir) -> ContentAddressableStore {
    ContentAddressableStore::open(dir.path(), CasConfig::default()).unwrap()
}

fn count_object_files(dir: &TempDir) -> usize {
    let mut n = 0;
    for shard in std::fs::read_dir(dir.path().join("objects")).unwrap() {
        n += std::fs::read_dir(shard.unwrap().path()).unwrap().count();
    }
    n
}

#[test]
fn test_hello_world_three_times() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let refs: Vec<_> = (0..3)
        .map(|_| store.store("hello world".as_bytes()).unwrap())
        .collect();

    assert_eq!(refs.len(), 3);
    assert!(refs.windows(2).all(|w| w[0].hash == w[1].hash));

    let stats = store.stats();
    assert_eq!(stats.unique_objects, 1);
    assert!(stats.deduplication_ratio > 0.0);
    assert_eq!(count_object_files(&dir), 1);
}

#[test]
fn test_round_trip_edge_content() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let empty = store.store(b"").unwrap();
    assert_eq!(store.retrieve(&empty).unwrap(), b"");

    let big = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n".repeat(60_000);
    assert!(big.len() > 3 * 1024 * 1024);
    let big_ref = store.store(big.as_bytes()).unwrap();
    assert_eq!(store.retrieve_string(&big_ref).unwrap(), big);

    let unicode = "日本語のテキスト 🚀 émojis & ñ ".repeat(50);
    let uni_ref = store.store(unicode.as_bytes()).unwrap();
    assert_eq!(store.retrieve_string(&uni_ref).unwrap(), unicode);
}

#[test]
fn test_concurrent_identical_stores_linearize() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..10 {
                    store.store(b"shared payload").unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = store.stats();
    assert_eq!(stats.unique_objects, 1);
    assert_eq!(stats.total_references, 80);
    assert_eq!(count_object_files(&dir), 1);
}

#[test]
fn test_reopen_preserves_counts_and_content() {
    let dir = TempDir::new().unwrap();
    let reference = {
        let store = open(&dir);
        store.store(b"survives restart").unwrap();
        store.store(b"survives restart").unwrap()
    };

    let store = open(&dir);
    assert_eq!(store.reference_count(&reference.hash), 2);
    assert_eq!(store.retrieve(&reference).unwrap(), b"survives restart");
    assert_eq!(store.release(&reference).unwrap(), 1);
}

fn object_path(dir: &TempDir, hash: &framestore_core::ContentHash) -> std::path::PathBuf {
    let hex = hash.to_hex();
    dir.path().join("objects").join(&hex[..2]).join(&hex[2..])
}

#[test]
fn test_huge_declared_size_is_corruption_not_allocation() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let text = "compressible ".repeat(500);
    let reference = store.store(text.as_bytes()).unwrap();

    let path = object_path(&dir, &reference.hash);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(
        store.retrieve(&reference),
        Err(Error::CorruptedContent(_))
    ));
    assert!(matches!(
        store.retrieve_string(&reference),
        Err(Error::CorruptedContent(_))
    ));
}

#[test]
fn test_corrupted_stored_size_is_detected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let reference = store.store(b"short object").unwrap();

    let path = object_path(&dir, &reference.hash);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[16..24].copy_from_slice(&(u64::MAX - 8).to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(
        store.retrieve(&reference),
        Err(Error::CorruptedContent(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_store_n_times_yields_count_n(content in proptest::collection::vec(any::<u8>(), 0..4096), n in 1usize..6) {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut last = None;
        for _ in 0..n {
            last = Some(store.store(&content).unwrap());
        }
        let reference = last.unwrap();
        prop_assert_eq!(reference.reference_count, n as u64);
        prop_assert_eq!(store.stats().unique_objects, 1);
        prop_assert_eq!(store.retrieve(&reference).unwrap(), content);
    }

    #[test]
    fn prop_text_round_trip(text in "\\PC{0,2000}") {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let reference = store.store(text.as_bytes()).unwrap();
        prop_assert_eq!(store.retrieve_string(&reference).unwrap(), text);
    }
}
