//! Write-ahead log integration tests
//!
//! - Replay after restart preserves order and commit state
//! - Appends stay off the disk path
//! - Checkpoint never loses uncommitted entries or resurrects committed ones
//! - Torn tails are truncated and corrupted middle lines skipped

use framestore_core::{FieldName, FieldUpdate, FieldValue, LogToken, RecordId};
use framestore_durability::{LogEntry, WalConfig, WriteAheadLog};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn open(dir: &TempDir) -> WriteAheadLog {
    WriteAheadLog::open(dir.path(), WalConfig::for_testing()).unwrap()
}

fn title_update(record: RecordId, n: usize) -> FieldUpdate {
    FieldUpdate::new(
        record,
        FieldName::Title,
        format!("title {n}"),
        format!("title {}", n + 1),
    )
}

#[test]
fn test_replay_preserves_order_and_values() {
    let dir = TempDir::new().unwrap();
    let record = RecordId::new();
    let appended: Vec<FieldUpdate> = {
        let wal = open(&dir);
        let updates: Vec<_> = (0..20).map(|n| title_update(record, n)).collect();
        for u in &updates {
            wal.append(u.clone()).unwrap();
        }
        wal.flush().unwrap();
        wal.get_uncommitted(&record)
    };

    let wal = open(&dir);
    let replayed = wal.get_uncommitted(&record);
    assert_eq!(replayed, appended);
    assert_eq!(replayed[0].new_value, FieldValue::Text("title 1".into()));
}

#[test]
fn test_commit_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let record = RecordId::new();
    let (committed, pending) = {
        let wal = open(&dir);
        let a = wal.append(title_update(record, 0)).unwrap();
        let b = wal.append(title_update(record, 1)).unwrap();
        wal.mark_committed(&[a]).unwrap();
        wal.flush().unwrap();
        (a, b)
    };

    let wal = open(&dir);
    let live: Vec<u64> = wal.uncommitted_entries().iter().map(|e| e.id).collect();
    assert_eq!(live, vec![pending.0]);
    assert_ne!(live[0], committed.0);

    // New ids continue past everything already handed out.
    let next = wal.append(title_update(record, 2)).unwrap();
    assert!(next.0 > pending.0);
}

#[test]
fn test_append_latency_stays_in_memory_path() {
    let dir = TempDir::new().unwrap();
    let wal = open(&dir);
    let record = RecordId::new();

    let mut slow = 0;
    let mut total = Duration::ZERO;
    for n in 0..100 {
        let start = Instant::now();
        wal.append(title_update(record, n)).unwrap();
        let elapsed = start.elapsed();
        total += elapsed;
        if elapsed >= Duration::from_millis(1) {
            slow += 1;
        }
    }
    assert!(total / 100 < Duration::from_millis(1));
    assert!(slow <= 5, "{slow} appends took 1ms or more");
}

#[test]
fn test_subscribers_notified_synchronously_in_order() {
    let dir = TempDir::new().unwrap();
    let wal = open(&dir);
    let seen: Arc<Mutex<Vec<LogToken>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    wal.subscribe(Arc::new(move |e: &LogEntry| sink.lock().push(e.token())));

    let record = RecordId::new();
    for n in 0..10 {
        let token = wal.append(title_update(record, n)).unwrap();
        assert_eq!(seen.lock().last(), Some(&token));
    }
}

#[test]
fn test_checkpoint_then_restart_drops_committed() {
    let dir = TempDir::new().unwrap();
    let record = RecordId::new();
    {
        let wal = open(&dir);
        let tokens: Vec<_> = (0..10)
            .map(|n| wal.append(title_update(record, n)).unwrap())
            .collect();
        wal.mark_committed(&tokens[..6]).unwrap();
        let report = wal.checkpoint().unwrap();
        assert_eq!(report.dropped, 6);
        assert_eq!(report.retained, 4);
        wal.flush().unwrap();
    }

    let wal = open(&dir);
    let ids: Vec<u64> = wal.uncommitted_entries().iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), 4);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(wal.len(), 4);
}

#[test]
fn test_appends_during_checkpoint_are_kept() {
    let dir = TempDir::new().unwrap();
    let wal = Arc::new(open(&dir));
    let record = RecordId::new();
    let first: Vec<_> = (0..50)
        .map(|n| wal.append(title_update(record, n)).unwrap())
        .collect();
    wal.mark_committed(&first).unwrap();

    let appender = {
        let wal = Arc::clone(&wal);
        std::thread::spawn(move || {
            for n in 50..150 {
                wal.append(title_update(record, n)).unwrap();
            }
        })
    };
    for _ in 0..5 {
        wal.checkpoint().unwrap();
    }
    appender.join().unwrap();
    wal.flush().unwrap();
    drop(wal);

    let wal = open(&dir);
    assert_eq!(wal.get_uncommitted(&record).len(), 100);
}

#[test]
fn test_torn_tail_truncated_on_open() {
    let dir = TempDir::new().unwrap();
    let record = RecordId::new();
    {
        let wal = open(&dir);
        for n in 0..3 {
            wal.append(title_update(record, n)).unwrap();
        }
        wal.flush().unwrap();
    }
    let path = dir.path().join("wal.log");
    let clean_len = fs::metadata(&path).unwrap().len();
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"E\t4\tnot-a-compl").unwrap();
    }

    let wal = open(&dir);
    assert_eq!(wal.get_uncommitted(&record).len(), 3);
    assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);

    // The log keeps working after truncation.
    wal.append(title_update(record, 3)).unwrap();
    wal.flush().unwrap();
    drop(wal);
    assert_eq!(open(&dir).get_uncommitted(&record).len(), 4);
}

#[test]
fn test_corrupted_middle_line_skipped() {
    let dir = TempDir::new().unwrap();
    let record = RecordId::new();
    {
        let wal = open(&dir);
        for n in 0..3 {
            wal.append(title_update(record, n)).unwrap();
        }
        wal.flush().unwrap();
    }
    let path = dir.path().join("wal.log");
    let text = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = text.lines().map(|l| format!("{l}\n")).collect();
    // Flip one character inside the second line's payload.
    lines[1] = lines[1].replacen("E\t", "E\tX", 1);
    fs::write(&path, lines.concat()).unwrap();

    let wal = open(&dir);
    assert_eq!(wal.get_uncommitted(&record).len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_restart_keeps_exactly_uncommitted(commit_mask in proptest::collection::vec(any::<bool>(), 1..40)) {
        let dir = TempDir::new().unwrap();
        let record = RecordId::new();
        let expected: Vec<u64> = {
            let wal = open(&dir);
            let tokens: Vec<_> = (0..commit_mask.len())
                .map(|n| wal.append(title_update(record, n)).unwrap())
                .collect();
            let to_commit: Vec<_> = tokens
                .iter()
                .zip(&commit_mask)
                .filter(|(_, c)| **c)
                .map(|(t, _)| *t)
                .collect();
            wal.mark_committed(&to_commit).unwrap();
            wal.flush().unwrap();
            tokens
                .iter()
                .zip(&commit_mask)
                .filter(|(_, c)| !**c)
                .map(|(t, _)| t.0)
                .collect()
        };

        let wal = open(&dir);
        let live: Vec<u64> = wal.uncommitted_entries().iter().map(|e| e.id).collect();
        prop_assert_eq!(live, expected);
    }
}
