//! The write-ahead log for pending field updates.
//!
//! `append` records the update in memory, notifies subscribers and queues the
//! encoded line for the writer thread before returning. It never waits for
//! the disk. Subscribers therefore see updates in exactly append order.
//!
//! Subscribers run while the log's state lock is held; a handler must not
//! call back into the same log.

use crate::wal::config::WalConfig;
use crate::wal::entry::{LineError, LogEntry, WalLine};
use crate::wal::reader;
use crate::wal::writer::{WalWriter, WriterCounters, WriterOp, WriterStats};
use chrono::{SubsecRound, Utc};
use framestore_core::{Error, FieldUpdate, LogToken, RecordId, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Callback invoked for every appended entry.
pub type UpdateHandler = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Handle returned by [`WriteAheadLog::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a checkpoint did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointReport {
    /// Committed entries dropped from memory and disk
    pub dropped: usize,
    /// Uncommitted entries carried into the new file
    pub retained: usize,
    /// False when the writer thread was gone and only memory was compacted
    pub persisted: bool,
}

/// Point-in-time view of the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalStats {
    /// Entries held in memory
    pub entries: usize,
    /// Entries not yet committed
    pub uncommitted: usize,
    /// Committed entries awaiting a checkpoint
    pub committed_since_checkpoint: usize,
    /// Next id to be handed out
    pub next_id: u64,
    /// Writer thread counters
    pub writer: WriterStats,
}

struct LogState {
    entries: VecDeque<LogEntry>,
    next_id: u64,
    committed_since_checkpoint: usize,
    last_checkpoint: Instant,
    writer: Option<WalWriter>,
}

impl LogState {
    fn send(&self, line: String) {
        let sent = self
            .writer
            .as_ref()
            .map(|w| w.send(WriterOp::Append(line)))
            .unwrap_or(false);
        if !sent {
            debug!(target: "framestore::wal", "WAL writer stopped, entry kept in memory only");
        }
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }
}

impl From<LineError> for Error {
    fn from(e: LineError) -> Self {
        Error::encoding(e.to_string())
    }
}

/// Durable, ordered log of field updates awaiting commit to the external store.
pub struct WriteAheadLog {
    path: PathBuf,
    config: WalConfig,
    state: Mutex<LogState>,
    subscribers: RwLock<Vec<(SubscriptionId, UpdateHandler)>>,
    next_subscription: AtomicU64,
    counters: Arc<WriterCounters>,
}

impl WriteAheadLog {
    /// Open (or create) the log inside `dir`, replaying any existing file.
    pub fn open(dir: impl AsRef<Path>, config: WalConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(&config.file_name);

        let outcome = reader::replay(&path)?;
        if outcome.has_torn_tail() {
            warn!(
                target: "framestore::wal",
                valid_len = outcome.valid_len,
                file_len = outcome.file_len,
                "Truncating torn WAL tail"
            );
            OpenOptions::new()
                .write(true)
                .open(&path)?
                .set_len(outcome.valid_len)?;
        }
        let committed = outcome.entries.iter().filter(|e| e.committed).count();
        info!(
            target: "framestore::wal",
            path = %path.display(),
            entries = outcome.entries.len(),
            committed,
            skipped = outcome.skipped_lines,
            next_id = outcome.next_id,
            "WAL replayed"
        );

        let writer = WalWriter::spawn(path.clone(), &config)?;
        let counters = Arc::clone(writer.counters());
        Ok(WriteAheadLog {
            path,
            config,
            state: Mutex::new(LogState {
                entries: outcome.entries.into(),
                next_id: outcome.next_id,
                committed_since_checkpoint: committed,
                last_checkpoint: Instant::now(),
                writer: Some(writer),
            }),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            counters,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an update. Returns once it is in memory and subscribers have
    /// seen it; the disk write happens on the writer thread.
    pub fn append(&self, mut update: FieldUpdate) -> Result<LogToken> {
        update.timestamp = update.timestamp.trunc_subsecs(6);
        let mut state = self.state.lock();
        let entry = LogEntry {
            id: state.next_id,
            update,
            timestamp: Utc::now().trunc_subsecs(6),
            committed: false,
        };
        let line = WalLine::Entry(entry.clone()).encode()?;
        state.next_id += 1;

        for (_, handler) in self.subscribers.read().iter() {
            handler(&entry);
        }
        state.send(line);
        let token = entry.token();
        state.entries.push_back(entry);
        Ok(token)
    }

    /// Register a handler for future appends.
    pub fn subscribe(&self, handler: UpdateHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Uncommitted updates for one record, oldest first.
    pub fn get_uncommitted(&self, record_id: &RecordId) -> Vec<FieldUpdate> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| !e.committed && e.update.record_id == *record_id)
            .map(|e| e.update.clone())
            .collect()
    }

    /// Every entry still held, committed or not, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    /// All uncommitted entries, oldest first.
    pub fn uncommitted_entries(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| !e.committed)
            .cloned()
            .collect()
    }

    /// Mark entries as absorbed by the external store.
    ///
    /// Unknown or already committed tokens are ignored. Returns how many
    /// entries changed state. Triggers a checkpoint once the committed
    /// backlog reaches the configured threshold.
    pub fn mark_committed(&self, tokens: &[LogToken]) -> Result<usize> {
        let (marked, backlog) = {
            let mut state = self.state.lock();
            let mut marked = 0;
            for token in tokens {
                let Some(pos) = state.position(token.0) else {
                    continue;
                };
                if state.entries[pos].committed {
                    continue;
                }
                state.entries[pos].committed = true;
                marked += 1;
                let line = WalLine::Commit(token.0).encode()?;
                state.send(line);
            }
            state.committed_since_checkpoint += marked;
            (marked, state.committed_since_checkpoint)
        };

        if backlog >= self.config.checkpoint_threshold {
            debug!(target: "framestore::wal", backlog, "Committed backlog reached threshold");
            self.checkpoint()?;
        }
        Ok(marked)
    }

    /// Drop committed entries and rewrite the file with only the survivors.
    ///
    /// Appends may proceed while the rewrite is on disk; the writer thread
    /// orders the rewrite before any line queued after it.
    pub fn checkpoint(&self) -> Result<CheckpointReport> {
        let (ack, mut report) = {
            let mut state = self.state.lock();
            let mut contents = WalLine::Checkpoint {
                next_id: state.next_id,
                timestamp: Utc::now().trunc_subsecs(6),
            }
            .encode()?;
            for entry in state.entries.iter().filter(|e| !e.committed) {
                contents.push_str(&WalLine::Entry(entry.clone()).encode()?);
            }

            let before = state.entries.len();
            state.entries.retain(|e| !e.committed);
            let report = CheckpointReport {
                dropped: before - state.entries.len(),
                retained: state.entries.len(),
                persisted: false,
            };
            state.committed_since_checkpoint = 0;
            state.last_checkpoint = Instant::now();

            let (tx, rx) = mpsc::channel();
            let sent = state
                .writer
                .as_ref()
                .map(|w| w.send(WriterOp::Rewrite { contents, ack: tx }))
                .unwrap_or(false);
            (sent.then_some(rx), report)
        };

        if let Some(ack) = ack {
            ack.recv()
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "WAL writer exited"))??;
            report.persisted = true;
        }
        info!(
            target: "framestore::wal",
            dropped = report.dropped,
            retained = report.retained,
            persisted = report.persisted,
            "WAL checkpoint"
        );
        Ok(report)
    }

    /// Checkpoint if the committed backlog or the interval demands it.
    pub fn maybe_checkpoint(&self) -> Result<Option<CheckpointReport>> {
        let due = {
            let state = self.state.lock();
            state.committed_since_checkpoint >= self.config.checkpoint_threshold
                || (state.committed_since_checkpoint > 0
                    && state.last_checkpoint.elapsed() >= self.config.checkpoint_interval)
        };
        if due {
            self.checkpoint().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Block until every queued line is on disk.
    pub fn flush(&self) -> Result<()> {
        let rx = {
            let state = self.state.lock();
            let (tx, rx) = mpsc::channel();
            let sent = state
                .writer
                .as_ref()
                .map(|w| w.send(WriterOp::Flush(tx)))
                .unwrap_or(false);
            if !sent {
                return Ok(());
            }
            rx
        };
        rx.recv()
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "WAL writer exited"))??;
        Ok(())
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    pub fn stats(&self) -> WalStats {
        let state = self.state.lock();
        WalStats {
            entries: state.entries.len(),
            uncommitted: state.entries.iter().filter(|e| !e.committed).count(),
            committed_since_checkpoint: state.committed_since_checkpoint,
            next_id: state.next_id,
            writer: self.counters.snapshot(),
        }
    }

    /// Drain pending writes and stop the writer thread. Later appends are
    /// kept in memory only.
    pub fn shutdown(&self) {
        let writer = self.state.lock().writer.take();
        if let Some(mut writer) = writer {
            writer.shutdown();
            debug!(target: "framestore::wal", "WAL writer stopped");
        }
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("stats", &self.stats())
            .finish()
    }
}
