//! WAL replay.
//!
//! Reads the log file front to back and rebuilds the set of live entries.
//! A line that fails to decode in the middle of the file is skipped with a
//! warning. Anything after the last decodable line is treated as a torn
//! tail: it is ignored and reported so the caller can truncate it.

use crate::wal::entry::{LogEntry, WalLine};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Result of replaying a log file.
#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    /// Live entries in id order, committed flags applied
    pub entries: Vec<LogEntry>,
    /// Next id the log should hand out
    pub next_id: u64,
    /// Byte offset just past the last valid line
    pub valid_len: u64,
    /// Total file length in bytes
    pub file_len: u64,
    /// Undecodable lines that were followed by valid ones
    pub skipped_lines: usize,
    /// Checkpoint markers encountered
    pub checkpoints: usize,
}

impl ReplayOutcome {
    /// Whether bytes after the last valid line must be truncated.
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Replay the log at `path`. A missing file replays as empty.
pub fn replay(path: &Path) -> io::Result<ReplayOutcome> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    Ok(replay_bytes(&bytes))
}

pub(crate) fn replay_bytes(bytes: &[u8]) -> ReplayOutcome {
    let mut outcome = ReplayOutcome {
        file_len: bytes.len() as u64,
        next_id: 1,
        ..ReplayOutcome::default()
    };
    let mut live: BTreeMap<u64, LogEntry> = BTreeMap::new();
    let mut failed_since_valid = 0usize;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let (end, complete) = match bytes[offset..].iter().position(|&b| b == b'\n') {
            Some(pos) => (offset + pos + 1, true),
            None => (bytes.len(), false),
        };
        let raw = &bytes[offset..end];
        let decoded = if complete {
            std::str::from_utf8(raw)
                .map_err(|e| e.to_string())
                .and_then(|line| WalLine::decode(line).map_err(|e| e.to_string()))
        } else {
            Err("unterminated line".to_string())
        };

        match decoded {
            Ok(line) => {
                outcome.skipped_lines += failed_since_valid;
                failed_since_valid = 0;
                outcome.valid_len = end as u64;
                apply(&mut live, &mut outcome, line);
            }
            Err(reason) => {
                failed_since_valid += 1;
                warn!(
                    target: "framestore::wal",
                    offset,
                    reason = %reason,
                    "Undecodable WAL line"
                );
            }
        }
        offset = end;
    }

    outcome.entries = live.into_values().collect();
    outcome
}

fn apply(live: &mut BTreeMap<u64, LogEntry>, outcome: &mut ReplayOutcome, line: WalLine) {
    match line {
        WalLine::Entry(entry) => {
            outcome.next_id = outcome.next_id.max(entry.id + 1);
            live.insert(entry.id, entry);
        }
        WalLine::Commit(id) => {
            if let Some(entry) = live.get_mut(&id) {
                entry.committed = true;
            }
        }
        WalLine::Checkpoint { next_id, .. } => {
            // The rewrite that wrote this marker re-lists every surviving
            // entry after it.
            live.clear();
            outcome.checkpoints += 1;
            outcome.next_id = outcome.next_id.max(next_id);
        }
    }
}
