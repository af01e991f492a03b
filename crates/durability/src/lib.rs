//! Durability layer for Framestore
//!
//! This crate owns the write-ahead log for pending field updates:
//!
//! - Non-blocking appends with in-order subscriber notification
//! - Background persistence with retry on I/O failure
//! - Commit markers and checkpointing that drop absorbed entries
//! - Replay with torn-tail truncation on open

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod wal;

pub use wal::{
    CheckpointReport, LogEntry, ReplayOutcome, SubscriptionId, UpdateHandler, WalConfig,
    WalConfigError, WalStats, WriteAheadLog, WriterStats,
};
