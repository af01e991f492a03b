//! Background persistence for the WAL.
//!
//! Appends never touch the disk on the caller's thread. Encoded lines are
//! handed to a dedicated `framestore-wal` thread which writes them through a
//! buffered file handle. Lines that fail to write stay in a retry backlog and
//! are retried with doubling backoff until the disk accepts them.
//!
//! The worker remembers the file length after its last successful flush. A
//! failed batch may have left part of a line on disk, so the file is cut
//! back to that length before anything is written again.

use crate::wal::config::WalConfig;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Work item for the writer thread.
pub(crate) enum WriterOp {
    /// Append one encoded line
    Append(String),
    /// Replace the whole file with `contents`, then acknowledge
    Rewrite {
        contents: String,
        ack: Sender<io::Result<()>>,
    },
    /// Write everything pending, then acknowledge
    Flush(Sender<io::Result<()>>),
    /// Write everything pending and exit
    Shutdown,
}

/// Cumulative writer counters.
///
/// Shared between the writer thread and the log so callers can observe
/// disk health without blocking on it.
#[derive(Debug, Default)]
pub struct WriterCounters {
    lines_written: AtomicU64,
    write_failures: AtomicU64,
    rewrites: AtomicU64,
    pending: AtomicUsize,
}

/// Point-in-time copy of [`WriterCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Lines that reached the file
    pub lines_written: u64,
    /// Failed write attempts (each retry counts)
    pub write_failures: u64,
    /// Completed checkpoint rewrites
    pub rewrites: u64,
    /// Lines queued or in the retry backlog
    pub pending: usize,
}

impl WriterCounters {
    pub(crate) fn snapshot(&self) -> WriterStats {
        WriterStats {
            lines_written: self.lines_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            rewrites: self.rewrites.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Owner of the writer thread.
pub(crate) struct WalWriter {
    tx: Sender<WriterOp>,
    thread: Option<JoinHandle<()>>,
    counters: Arc<WriterCounters>,
}

impl WalWriter {
    /// Spawn the writer thread for `path`.
    pub(crate) fn spawn(path: PathBuf, config: &WalConfig) -> io::Result<Self> {
        Self::start(Worker::new(path, config))
    }

    /// Spawn a writer whose file accepts `budget` more bytes, after which
    /// every write fails.
    #[cfg(test)]
    fn spawn_with_budget(
        path: PathBuf,
        config: &WalConfig,
        budget: Arc<AtomicUsize>,
    ) -> io::Result<Self> {
        let mut worker = Worker::new(path, config);
        worker.budget = Some(budget);
        Self::start(worker)
    }

    fn start(mut worker: Worker) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let counters = Arc::clone(&worker.counters);
        let thread = thread::Builder::new()
            .name("framestore-wal".to_string())
            .spawn(move || worker.run(rx))?;
        Ok(WalWriter {
            tx,
            thread: Some(thread),
            counters,
        })
    }

    /// Queue an operation. Returns false once the thread has exited.
    pub(crate) fn send(&self, op: WriterOp) -> bool {
        let is_append = matches!(op, WriterOp::Append(_));
        if is_append {
            self.counters.pending.fetch_add(1, Ordering::Relaxed);
        }
        let sent = self.tx.send(op).is_ok();
        if is_append && !sent {
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
        }
        sent
    }

    pub(crate) fn counters(&self) -> &Arc<WriterCounters> {
        &self.counters
    }

    /// Drain pending lines and join the thread.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.tx.send(WriterOp::Shutdown);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!(target: "framestore::wal", "WAL writer thread panicked");
            }
        }
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The log file handle the buffer writes through.
struct LogSink {
    file: File,
    #[cfg(test)]
    budget: Option<Arc<AtomicUsize>>,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        #[cfg(test)]
        if let Some(budget) = &self.budget {
            let allowed = buf.len().min(budget.load(Ordering::SeqCst));
            if allowed == 0 && !buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::Other, "write budget exhausted"));
            }
            let n = self.file.write(&buf[..allowed])?;
            budget.fetch_sub(n, Ordering::SeqCst);
            return Ok(n);
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

struct Worker {
    path: PathBuf,
    file: Option<BufWriter<LogSink>>,
    /// File length after the last successful flush; `None` until first open
    good_len: Option<u64>,
    backlog: VecDeque<String>,
    backoff: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
    sync_on_flush: bool,
    counters: Arc<WriterCounters>,
    #[cfg(test)]
    budget: Option<Arc<AtomicUsize>>,
}

impl Worker {
    fn new(path: PathBuf, config: &WalConfig) -> Self {
        Worker {
            path,
            file: None,
            good_len: None,
            backlog: VecDeque::new(),
            backoff: config.retry_initial_backoff,
            initial_backoff: config.retry_initial_backoff,
            max_backoff: config.retry_max_backoff,
            sync_on_flush: config.sync_on_flush,
            counters: Arc::new(WriterCounters::default()),
            #[cfg(test)]
            budget: None,
        }
    }

    fn run(&mut self, rx: Receiver<WriterOp>) {
        loop {
            let next = if self.backlog.is_empty() {
                rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
            } else {
                rx.recv_timeout(self.backoff)
            };

            let mut stop = match next {
                Ok(op) => self.handle(op),
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => true,
            };
            // Batch everything already queued before touching the file.
            while !stop {
                match rx.try_recv() {
                    Ok(op) => stop = self.handle(op),
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => stop = true,
                }
            }

            let drained = self.drain();
            if stop {
                if let Err(e) = drained {
                    warn!(
                        target: "framestore::wal",
                        pending = self.backlog.len(),
                        error = %e,
                        "WAL writer exiting with unwritten lines"
                    );
                }
                return;
            }
        }
    }

    /// Returns true when the thread should exit.
    fn handle(&mut self, op: WriterOp) -> bool {
        match op {
            WriterOp::Append(line) => {
                self.backlog.push_back(line);
                false
            }
            WriterOp::Rewrite { contents, ack } => {
                let result = self.rewrite(&contents);
                let _ = ack.send(result);
                false
            }
            WriterOp::Flush(ack) => {
                let result = self.drain().and_then(|()| self.sync());
                let _ = ack.send(result);
                false
            }
            WriterOp::Shutdown => true,
        }
    }

    /// Write the backlog in order. Stops at the first failure.
    fn drain(&mut self) -> io::Result<()> {
        if self.backlog.is_empty() {
            return Ok(());
        }
        match self.try_drain() {
            Ok(()) => {
                self.backoff = self.initial_backoff;
                Ok(())
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "framestore::wal",
                    pending = self.backlog.len(),
                    retry_in_ms = self.backoff.as_millis() as u64,
                    error = %e,
                    "WAL write failed, will retry"
                );
                self.discard_file();
                self.backoff = (self.backoff * 2).min(self.max_backoff);
                Err(e)
            }
        }
    }

    fn try_drain(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            self.file = Some(self.open()?);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let mut bytes = 0u64;
        for line in &self.backlog {
            file.write_all(line.as_bytes())?;
            bytes += line.len() as u64;
        }
        file.flush()?;

        let written = self.backlog.len();
        self.backlog.clear();
        self.good_len = self.good_len.map(|len| len + bytes);
        self.counters
            .lines_written
            .fetch_add(written as u64, Ordering::Relaxed);
        self.counters.pending.fetch_sub(written, Ordering::Relaxed);
        Ok(())
    }

    /// Open for append, first cutting off anything past the last
    /// successful flush.
    fn open(&mut self) -> io::Result<BufWriter<LogSink>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let len = file.metadata()?.len();
        let good = self.good_len.map_or(len, |good| good.min(len));
        if len > good {
            file.set_len(good)?;
            debug!(
                target: "framestore::wal",
                dropped_bytes = len - good,
                "Cut partial WAL write before retry"
            );
        }
        self.good_len = Some(good);
        Ok(BufWriter::new(LogSink {
            file,
            #[cfg(test)]
            budget: self.budget.clone(),
        }))
    }

    /// Drop the handle without flushing what is still buffered, and cut the
    /// file back to its last good length. If the cut fails here the next
    /// `open` repeats it.
    fn discard_file(&mut self) {
        let Some(writer) = self.file.take() else {
            return;
        };
        let (sink, _unwritten) = writer.into_parts();
        if let Some(good) = self.good_len {
            if let Err(e) = sink.file.set_len(good) {
                warn!(
                    target: "framestore::wal",
                    error = %e,
                    "Failed to cut partial WAL write"
                );
            }
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        if !self.sync_on_flush {
            return Ok(());
        }
        match self.file.as_mut() {
            Some(file) => file.get_ref().file.sync_data(),
            None => Ok(()),
        }
    }

    /// Atomically replace the file. Lines queued before the rewrite are
    /// already reflected in `contents`, so the backlog is discarded on
    /// success and kept on failure.
    fn rewrite(&mut self, contents: &str) -> io::Result<()> {
        self.file = None;
        let tmp = self.path.with_extension("log.tmp");
        let result = write_and_rename(&tmp, &self.path, contents);
        match &result {
            Ok(()) => {
                self.good_len = Some(contents.len() as u64);
                let dropped = self.backlog.len();
                self.backlog.clear();
                self.counters.pending.fetch_sub(dropped, Ordering::Relaxed);
                self.counters.rewrites.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "framestore::wal",
                    bytes = contents.len(),
                    superseded = dropped,
                    "WAL rewritten"
                );
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(target: "framestore::wal", error = %e, "WAL checkpoint rewrite failed");
                let _ = fs::remove_file(&tmp);
            }
        }
        result
    }
}

fn write_and_rename(tmp: &Path, path: &Path, contents: &str) -> io::Result<()> {
    {
        let mut file = File::create(tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_data()?;
    }
    fs::rename(tmp, path)
}
