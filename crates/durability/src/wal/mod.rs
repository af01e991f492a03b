//! WAL (Write-Ahead Log) module
//!
//! - `entry`: LogEntry and the checksummed line codec
//! - `config`: WAL configuration (WalConfig, WalConfigError)
//! - `writer`: background writer thread with retry
//! - `reader`: replay and torn-tail detection
//! - `log`: WriteAheadLog, the public append/commit/checkpoint surface

pub mod config;
pub mod entry;
pub mod log;
pub mod reader;
mod writer;

pub use config::{WalConfig, WalConfigError, DEFAULT_WAL_FILE_NAME};
pub use entry::{LineError, LogEntry, WalLine};
pub use log::{CheckpointReport, SubscriptionId, UpdateHandler, WalStats, WriteAheadLog};
pub use reader::{replay, ReplayOutcome};
pub use writer::WriterStats;
