//! Engine for Framestore
//!
//! This crate wires the lower layers into one coordinator:
//! - Coordinator: owns every subsystem, answers foreground reads within the
//!   frame budget, hands slow work to the scheduler
//! - RenderCache and renderers: two-tier rendered-output cache
//! - BackgroundScheduler: prioritized worker pool with cancellation
//! - EngineConfig: `framestore.toml` loading and validation
//! - EngineMetrics: counters and frame-budget overruns
//!
//! The coordinator is the only component external callers need.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod render;
pub mod render_cache;
pub mod source;

pub use background::{
    BackgroundScheduler, BackpressureError, CancellationToken, KeyedTask, SchedulerStats,
    TaskHandle, TaskOutcome, TaskPriority,
};
pub use config::{EngineConfig, SchedulerSection, StorageSection, WalSection, CONFIG_FILE_NAME};
pub use coordinator::{Coordinator, IngestHandles, PressureReport};
pub use metrics::{EngineMetrics, MetricsSnapshot, Operation};
pub use render::{markdown_to_html, placeholder, render_for_category, MarkdownRenderer, Renderer};
pub use render_cache::{BatchReport, RenderCache, RenderCacheConfig, RenderCacheStats};
pub use source::{MemorySource, RecordSource};
