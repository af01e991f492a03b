//! Framestore - latency-bounded local data serving for interactive UIs
//!
//! Framestore sits between a persistent record store and a UI and keeps every
//! foreground read inside a frame budget (16 ms by default). It owns a
//! rendered-output cache, a full-text index, a statistics cache, an update
//! log, a deduplicating blob store and a columnar projection of the records,
//! and keeps them warm on a background scheduler.
//!
//! # Quick Start
//!
//! ```ignore
//! use framestore::{Category, Coordinator, Record};
//!
//! let engine = Coordinator::open("/path/to/data")?;
//! let records = vec![Record::new("Perf", "render performance notes", Category::Note)];
//! engine.ingest(records.clone())?.wait();
//!
//! let hits = engine.search("performnace", &records);
//! let html = engine.get_rendered_output("# Title");
//! ```
//!
//! # Architecture
//!
//! All operations go through the [`Coordinator`]. The subsystem crates are
//! re-exported for their types; callers should not need to construct the
//! subsystems directly.

pub use framestore_core::*;
pub use framestore_engine::*;

pub use framestore_durability::{CheckpointReport, LogEntry, SubscriptionId, WalStats};
pub use framestore_search::{CompactionReport, IndexConfig, IndexStats, StatsConfig};
pub use framestore_storage::{CasStats, ColumnarRow, GcReport, RowIndex};
