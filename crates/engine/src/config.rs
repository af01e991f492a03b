//! Engine configuration via `framestore.toml`
//!
//! On first open a default `framestore.toml` is written to the data
//! directory. To change settings, edit the file and reopen the engine.

use crate::render_cache::RenderCacheConfig;
use framestore_core::{Error, Result};
use framestore_durability::WalConfig;
use framestore_search::{IndexConfig, StatsConfig};
use framestore_storage::CasConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "framestore.toml";

// ============================================================================
// Sections
// ============================================================================

/// `[storage]`: content store and columnar projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Blobs larger than this are compressed when it helps
    pub compression_threshold: usize,
    /// Blobs at least this large are read through a memory map
    pub mmap_threshold: usize,
    /// zstd level
    pub compression_level: i32,
    /// fsync blob and index writes
    pub sync_writes: bool,
    /// Reference journal records kept before folding into the index
    pub index_compaction_records: usize,
    /// Columnar content beyond this many bytes is kept as a preview
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_content_bytes: Option<usize>,
}

impl Default for StorageSection {
    fn default() -> Self {
        let cas = CasConfig::default();
        StorageSection {
            compression_threshold: cas.compression_threshold,
            mmap_threshold: cas.mmap_threshold,
            compression_level: cas.compression_level,
            sync_writes: cas.sync_writes,
            index_compaction_records: cas.index_compaction_records,
            max_content_bytes: None,
        }
    }
}

impl StorageSection {
    /// Content store settings
    pub fn cas_config(&self) -> CasConfig {
        CasConfig {
            compression_threshold: self.compression_threshold,
            mmap_threshold: self.mmap_threshold,
            compression_level: self.compression_level,
            sync_writes: self.sync_writes,
            index_compaction_records: self.index_compaction_records,
        }
    }
}

/// `[wal]`: update log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalSection {
    /// Seconds between time-based checkpoints
    pub checkpoint_interval_secs: u64,
    /// Committed entries that force a checkpoint
    pub checkpoint_threshold: usize,
    /// fsync on explicit flush
    pub sync_on_flush: bool,
    /// Period of the maintenance thread, in milliseconds
    pub maintenance_interval_ms: u64,
}

impl Default for WalSection {
    fn default() -> Self {
        let wal = WalConfig::default();
        WalSection {
            checkpoint_interval_secs: wal.checkpoint_interval.as_secs(),
            checkpoint_threshold: wal.checkpoint_threshold,
            sync_on_flush: wal.sync_on_flush,
            maintenance_interval_ms: 1_000,
        }
    }
}

impl WalSection {
    /// Log settings
    pub fn wal_config(&self) -> WalConfig {
        WalConfig {
            checkpoint_interval: Duration::from_secs(self.checkpoint_interval_secs),
            checkpoint_threshold: self.checkpoint_threshold,
            sync_on_flush: self.sync_on_flush,
            ..WalConfig::default()
        }
    }

    /// Maintenance tick
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

/// `[scheduler]`: background worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Worker threads, 0 for one per available core
    pub worker_threads: usize,
    /// Queued tasks beyond which new work is rejected
    pub max_queue_depth: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        SchedulerSection {
            worker_threads: 0,
            max_queue_depth: 1024,
        }
    }
}

impl SchedulerSection {
    /// Effective worker count
    pub fn threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

/// Engine configuration loaded from `framestore.toml`.
///
/// # Example
///
/// ```toml
/// frame_budget_ms = 16
///
/// [render]
/// capacity = 1000
///
/// [wal]
/// checkpoint_threshold = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Foreground operations slower than this are counted as overruns
    pub frame_budget_ms: u64,
    /// Render cache
    pub render: RenderCacheConfig,
    /// Text index
    pub search: IndexConfig,
    /// Statistics cache
    pub stats: StatsConfig,
    /// Content store and columnar projection
    pub storage: StorageSection,
    /// Update log
    pub wal: WalSection,
    /// Background workers
    pub scheduler: SchedulerSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            frame_budget_ms: 16,
            render: RenderCacheConfig::default(),
            search: IndexConfig::default(),
            stats: StatsConfig::default(),
            storage: StorageSection::default(),
            wal: WalSection::default(),
            scheduler: SchedulerSection::default(),
        }
    }
}

impl EngineConfig {
    /// Frame budget as a duration
    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.frame_budget_ms == 0 {
            return Err(Error::invalid_config("frame_budget_ms must be at least 1"));
        }
        if self.render.capacity == 0 {
            return Err(Error::invalid_config("render.capacity must be at least 1"));
        }
        if self.search.batch_size == 0 {
            return Err(Error::invalid_config("search.batch_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.search.fuzzy_threshold) {
            return Err(Error::invalid_config(format!(
                "search.fuzzy_threshold must be within 0..=1, got {}",
                self.search.fuzzy_threshold
            )));
        }
        if self.storage.index_compaction_records == 0 {
            return Err(Error::invalid_config(
                "storage.index_compaction_records must be at least 1",
            ));
        }
        if self.stats.cache_capacity == 0 {
            return Err(Error::invalid_config("stats.cache_capacity must be at least 1"));
        }
        if self.scheduler.max_queue_depth == 0 {
            return Err(Error::invalid_config(
                "scheduler.max_queue_depth must be at least 1",
            ));
        }
        if self.wal.maintenance_interval_ms == 0 {
            return Err(Error::invalid_config(
                "wal.maintenance_interval_ms must be at least 1",
            ));
        }
        self.wal
            .wal_config()
            .validate()
            .map_err(|e| Error::invalid_config(format!("wal: {}", e)))?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Framestore engine configuration
#
# Foreground reads slower than this are counted as frame-budget overruns.
frame_budget_ms = 16

[render]
# Rendered outputs kept in memory
capacity = 1000
# Also keep rendered output on disk under render/
disk_tier = true
# Sources up to this many bytes render inline on a cache miss;
# larger ones return a placeholder and render in the background
inline_render_bytes = 16384
placeholder_chars = 200

[search]
batch_size = 512
preview_chars = 200
fuzzy_threshold = 0.3
min_postings = 2

[stats]
cache_capacity = 10000

[storage]
compression_threshold = 1024
mmap_threshold = 65536
compression_level = 3
sync_writes = true
# Reference changes journaled before the index file is rewritten
index_compaction_records = 1024
# max_content_bytes = 4096

[wal]
checkpoint_interval_secs = 60
checkpoint_threshold = 1000
sync_on_flush = true
maintenance_interval_ms = 1000

[scheduler]
# 0 = one worker per available core
worker_threads = 0
max_queue_depth = 1024
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidConfig` if it cannot be
    /// parsed or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::encoding(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
