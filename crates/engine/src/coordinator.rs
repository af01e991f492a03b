//! Engine coordinator
//!
//! The Coordinator owns every subsystem and is the only type callers touch.
//! Foreground operations answer from caches or compute inline when the input
//! is small; everything else is handed to the background scheduler and the
//! caller gets a placeholder.
//!
//! ## Data Directory
//!
//! ```text
//! <data_dir>/
//! ├── framestore.toml
//! ├── blobs/          # content-addressable store
//! ├── wal/wal.log     # pending field updates
//! └── render/         # rendered output disk tier
//! ```
//!
//! # Thread Safety
//!
//! Subsystems are individually shared (`Arc`) so background tasks can reach
//! them without borrowing the coordinator. Each one serializes its own
//! mutations; reads run concurrently.

use crate::background::{
    BackgroundScheduler, KeyedTask, SchedulerStats, TaskHandle, TaskPriority,
};
use crate::config::{EngineConfig, CONFIG_FILE_NAME};
use crate::metrics::{EngineMetrics, MetricsSnapshot, Operation};
use crate::render::{placeholder, render_for_category, MarkdownRenderer, Renderer};
use crate::render_cache::{record_key, RenderCache, RenderCacheStats};
use crate::source::RecordSource;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use framestore_core::{
    Category, ContentHash, ContentReference, FieldUpdate, LogToken, Record, RecordId,
    RenderedOutput, Result, SearchResult, TextStatistics,
};
use framestore_durability::{CheckpointReport, LogEntry, SubscriptionId, WalStats, WriteAheadLog};
use framestore_search::{CompactionReport, IndexStats, StatsComputer, TextIndexer};
use framestore_storage::{
    CasStats, ColumnarRow, ColumnarStore, ContentAddressableStore, GcReport, RowIndex, RowInput,
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Blob store directory name
pub const BLOBS_DIR_NAME: &str = "blobs";
/// WAL directory name
pub const WAL_DIR_NAME: &str = "wal";
/// Render disk tier directory name
pub const RENDER_DIR_NAME: &str = "render";

const PREFETCH_KEY: &str = "prefetch";
const INGEST_INDEX_KEY: &str = "ingest:index";
const INGEST_COLUMNAR_KEY: &str = "ingest:columnar";
const INGEST_RENDER_KEY: &str = "ingest:render";
const INGEST_STATS_KEY: &str = "ingest:stats";

// ============================================================================
// Reports
// ============================================================================

/// What one round of memory-pressure handling released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PressureReport {
    /// Render entries dropped from memory
    pub render_evicted: usize,
    /// Index entries removed by compaction
    pub index: CompactionReport,
    /// Statistics entries dropped
    pub stats_cleared: usize,
}

/// Handles for the tasks scheduled by one ingest.
#[derive(Debug)]
pub struct IngestHandles {
    /// Index build (High)
    pub index: TaskHandle,
    /// Columnar rebuild (Medium)
    pub columnar: TaskHandle,
    /// Pre-render (Low)
    pub render: TaskHandle,
    /// Statistics pre-computation (Low)
    pub stats: TaskHandle,
}

impl IngestHandles {
    /// Block until all four tasks ended.
    pub fn wait(&self) {
        for handle in [&self.index, &self.columnar, &self.render, &self.stats] {
            handle.wait();
        }
    }
}

// ============================================================================
// Render inputs
// ============================================================================

#[derive(Clone, Copy)]
enum RenderInput<'a> {
    Text(&'a str),
    Record(&'a Record),
}

impl RenderInput<'_> {
    fn source(&self) -> &str {
        match *self {
            RenderInput::Text(text) => text,
            RenderInput::Record(record) => &record.body,
        }
    }

    fn render(&self, renderer: &dyn Renderer) -> Result<String> {
        match self {
            RenderInput::Text(text) => renderer.render(text),
            RenderInput::Record(r) => render_for_category(renderer, r.category, &r.title, &r.body),
        }
    }

    fn to_job(self) -> RenderJob {
        match self {
            RenderInput::Text(text) => RenderJob::Text(text.to_string()),
            RenderInput::Record(record) => RenderJob::Record(Box::new(record.clone())),
        }
    }
}

enum RenderJob {
    Text(String),
    Record(Box<Record>),
}

impl RenderJob {
    fn as_input(&self) -> RenderInput<'_> {
        match self {
            RenderJob::Text(text) => RenderInput::Text(text),
            RenderJob::Record(record) => RenderInput::Record(record),
        }
    }
}

/// Removes a key from the in-flight registry when the render task ends,
/// including by panic.
struct InFlightGuard {
    registry: Arc<DashMap<ContentHash, Instant>>,
    key: ContentHash,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

// ============================================================================
// Maintenance thread
// ============================================================================

/// Periodic housekeeping: time-based WAL checkpoints, and restoring the
/// render cache bound that memory-pressure handling reduced.
struct Maintenance {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Maintenance {
    fn spawn(
        wal: Arc<WriteAheadLog>,
        render_cache: Arc<RenderCache>,
        interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("framestore-maintenance".to_string())
            .spawn(move || {
                let (lock, cvar) = &*signal;
                let mut stopped = lock.lock();
                while !*stopped {
                    cvar.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                    match wal.maybe_checkpoint() {
                        Ok(Some(report)) => debug!(
                            target: "framestore::engine",
                            dropped = report.dropped,
                            retained = report.retained,
                            "Periodic checkpoint"
                        ),
                        Ok(None) => {}
                        Err(e) => warn!(target: "framestore::engine", error = %e, "Periodic checkpoint failed"),
                    }
                    if render_cache.reset_capacity() {
                        debug!(
                            target: "framestore::engine",
                            capacity = render_cache.capacity(),
                            "Render cache bound restored"
                        );
                    }
                }
            })?;
        Ok(Maintenance {
            stop,
            handle: Mutex::new(Some(handle)),
        })
    }

    fn stop(&self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Owner of every subsystem and the engine's public surface.
pub struct Coordinator {
    data_dir: PathBuf,
    config: EngineConfig,
    renderer: Arc<dyn Renderer>,
    render_cache: Arc<RenderCache>,
    in_flight: Arc<DashMap<ContentHash, Instant>>,
    indexer: Arc<TextIndexer>,
    stats: Arc<StatsComputer>,
    cas: ContentAddressableStore,
    columnar: Arc<RwLock<Arc<ColumnarStore>>>,
    wal: Arc<WriteAheadLog>,
    scheduler: BackgroundScheduler,
    metrics: Arc<EngineMetrics>,
    maintenance: Maintenance,
    closed: AtomicBool,
}

impl Coordinator {
    /// Open the engine in `data_dir`, reading `framestore.toml`.
    ///
    /// A default config file is written on first open.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&config_path)?;
        let config = EngineConfig::from_file(&config_path)?;
        Self::open_inner(data_dir, config, Arc::new(MarkdownRenderer))
    }

    /// Open with an explicit configuration.
    ///
    /// The config is written to `framestore.toml` so a later `open` picks it up.
    pub fn open_with_config(data_dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        Self::open_with_renderer(data_dir, config, Arc::new(MarkdownRenderer))
    }

    /// Open with an explicit configuration and renderer.
    pub fn open_with_renderer(
        data_dir: impl AsRef<Path>,
        config: EngineConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        config.validate()?;
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        config.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;
        Self::open_inner(data_dir, config, renderer)
    }

    fn open_inner(data_dir: &Path, config: EngineConfig, renderer: Arc<dyn Renderer>) -> Result<Self> {
        let cas = ContentAddressableStore::open(
            data_dir.join(BLOBS_DIR_NAME),
            config.storage.cas_config(),
        )?;
        let wal = Arc::new(WriteAheadLog::open(
            data_dir.join(WAL_DIR_NAME),
            config.wal.wal_config(),
        )?);
        let render_cache = Arc::new(RenderCache::open(
            data_dir.join(RENDER_DIR_NAME),
            config.render.clone(),
        )?);
        let columnar = match config.storage.max_content_bytes {
            Some(max) => ColumnarStore::with_content_limit(max),
            None => ColumnarStore::new(),
        };
        let scheduler =
            BackgroundScheduler::new(config.scheduler.threads(), config.scheduler.max_queue_depth)?;
        let maintenance = Maintenance::spawn(
            Arc::clone(&wal),
            Arc::clone(&render_cache),
            config.wal.maintenance_interval(),
        )?;

        info!(
            target: "framestore::engine",
            data_dir = %data_dir.display(),
            workers = config.scheduler.threads(),
            pending_updates = wal.len(),
            "Engine opened"
        );

        Ok(Coordinator {
            data_dir: data_dir.to_path_buf(),
            metrics: Arc::new(EngineMetrics::new(config.frame_budget())),
            indexer: Arc::new(TextIndexer::new(config.search.clone())),
            stats: Arc::new(StatsComputer::new(config.stats.clone())),
            config,
            renderer,
            render_cache,
            in_flight: Arc::new(DashMap::new()),
            cas,
            columnar: Arc::new(RwLock::new(Arc::new(columnar))),
            wal,
            scheduler,
            maintenance,
            closed: AtomicBool::new(false),
        })
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Rendered output for `text`.
    ///
    /// Cached output returns immediately. Inputs up to `inline_render_bytes`
    /// render inline; larger ones return a placeholder while a background
    /// task renders and caches the full output.
    pub fn get_rendered_output(&self, text: &str) -> RenderedOutput {
        self.rendered(ContentHash::of_str(text), RenderInput::Text(text))
    }

    /// Category-aware rendered output for a record.
    pub fn render_record(&self, record: &Record) -> RenderedOutput {
        self.rendered(record_key(record), RenderInput::Record(record))
    }

    fn rendered(&self, key: ContentHash, input: RenderInput<'_>) -> RenderedOutput {
        let started = Instant::now();
        if let Some(hit) = self.render_cache.get_by_key(&key) {
            self.metrics.record_render_hit();
            self.metrics.finish(Operation::Render, started);
            return hit;
        }

        let chars = self.config.render.placeholder_chars;
        if input.source().len() > self.config.render.inline_render_bytes {
            self.schedule_render(key, input);
            self.metrics.record_placeholder();
            self.metrics.finish(Operation::Render, started);
            return RenderedOutput::placeholder(placeholder(input.source(), chars));
        }

        let output = match input.render(self.renderer.as_ref()) {
            Ok(content) => RenderedOutput::complete(content, started.elapsed().as_secs_f64()),
            Err(e) => {
                warn!(target: "framestore::render", error = %e, "Inline render failed");
                self.metrics.record_placeholder();
                self.metrics.finish(Operation::Render, started);
                return RenderedOutput::placeholder(placeholder(input.source(), chars));
            }
        };
        if let Err(e) = self.render_cache.store_by_key(key, output.clone()) {
            warn!(target: "framestore::render", error = %e, "Caching render failed");
        }
        self.metrics.record_render_miss();
        self.metrics.finish(Operation::Render, started);
        output
    }

    fn schedule_render(&self, key: ContentHash, input: RenderInput<'_>) {
        match self.in_flight.entry(key) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
            }
        }
        let guard = InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            key,
        };
        let job = input.to_job();
        let renderer = Arc::clone(&self.renderer);
        let cache = Arc::clone(&self.render_cache);
        let metrics = Arc::clone(&self.metrics);

        let queued = self.scheduler.start_task("render", TaskPriority::High, move |token| {
            let _guard = guard;
            if token.is_cancelled() {
                return;
            }
            let started = Instant::now();
            match job.as_input().render(renderer.as_ref()) {
                Ok(content) => {
                    let output = RenderedOutput::complete(content, started.elapsed().as_secs_f64());
                    if let Err(e) = cache.store_by_key(key, output) {
                        metrics.record_background_failure();
                        warn!(target: "framestore::render", error = %e, "Caching background render failed");
                    }
                }
                Err(e) => {
                    metrics.record_background_failure();
                    warn!(target: "framestore::render", error = %e, "Background render failed");
                }
            }
        });
        if let Err(e) = queued {
            // The closure (and its guard) was dropped, so the key is free again.
            self.metrics.record_background_failure();
            warn!(target: "framestore::render", error = %e, "Background render rejected");
        }
    }

    /// Renders currently queued or running in the background
    pub fn renders_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    // ========================================================================
    // Statistics & search
    // ========================================================================

    /// Statistics for `text`, cached by content hash.
    pub fn get_text_stats(&self, text: &str) -> TextStatistics {
        let started = Instant::now();
        let key = ContentHash::of_str(text);
        let stats = match self.stats.get_cached(&key) {
            Some(hit) => {
                self.metrics.record_stats(true);
                hit
            }
            None => {
                self.metrics.record_stats(false);
                self.stats.compute(text, key)
            }
        };
        self.metrics.finish(Operation::Stats, started);
        stats
    }

    /// Ranked matches for `query` among `candidates`.
    ///
    /// Returns an empty list when nothing has been indexed yet.
    pub fn search(&self, query: &str, candidates: &[Record]) -> Vec<SearchResult> {
        let started = Instant::now();
        let results = self.indexer.search(query, candidates);
        let elapsed = self.metrics.finish(Operation::Search, started);
        self.metrics.record_search(elapsed);
        results
    }

    /// Index counters
    pub fn index_stats(&self) -> IndexStats {
        self.indexer.stats()
    }

    // ========================================================================
    // Content store
    // ========================================================================

    /// Store `text` once, returning a shared reference.
    pub fn deduplicate_content(&self, text: &str) -> Result<ContentReference> {
        self.cas.store(text.as_bytes())
    }

    /// Text behind `reference`.
    pub fn retrieve_content(&self, reference: &ContentReference) -> Result<String> {
        self.cas.retrieve_string(reference)
    }

    /// Drop one reference; returns the remaining count.
    pub fn release_content(&self, reference: &ContentReference) -> Result<u64> {
        self.cas.release(reference)
    }

    /// Sweep untracked objects and temp files.
    pub fn collect_garbage(&self) -> Result<GcReport> {
        self.cas.garbage_collect()
    }

    /// Content store counters
    pub fn storage_stats(&self) -> CasStats {
        self.cas.stats()
    }

    // ========================================================================
    // Update log
    // ========================================================================

    /// Record a field update. Returns once it is in memory and every
    /// subscriber has seen it.
    pub fn log_update(&self, update: FieldUpdate) -> Result<LogToken> {
        let started = Instant::now();
        let token = self.wal.append(update)?;
        self.metrics.record_wal_append();
        self.metrics.finish(Operation::LogUpdate, started);
        Ok(token)
    }

    /// Register a handler called synchronously for every logged update.
    ///
    /// The handler must not call back into the update log.
    pub fn subscribe(&self, handler: impl Fn(&LogEntry) + Send + Sync + 'static) -> SubscriptionId {
        self.wal.subscribe(Arc::new(handler))
    }

    /// Remove a handler; returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.wal.unsubscribe(id)
    }

    /// Updates to `record_id` not yet committed, in log order.
    pub fn uncommitted_updates(&self, record_id: &RecordId) -> Vec<FieldUpdate> {
        self.wal.get_uncommitted(record_id)
    }

    /// Mark updates as absorbed by the durable store.
    pub fn mark_committed(&self, tokens: &[LogToken]) -> Result<usize> {
        self.wal.mark_committed(tokens)
    }

    /// Drop committed updates and rewrite the log.
    pub fn checkpoint(&self) -> Result<CheckpointReport> {
        self.wal.checkpoint()
    }

    /// Wait until every logged update is on disk.
    pub fn flush_log(&self) -> Result<()> {
        self.wal.flush()
    }

    /// Update log counters
    pub fn wal_stats(&self) -> WalStats {
        self.wal.stats()
    }

    // ========================================================================
    // Ingest & prefetch
    // ========================================================================

    /// Rebuild derived state for `records` in the background.
    ///
    /// Schedules the index build (High), the columnar rebuild (Medium), then
    /// pre-rendering and statistics pre-computation (Low). The four stages are
    /// queued together or not at all. A later ingest cancels any of these
    /// that have not started.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the scheduler cannot take all four stages; no
    /// stage was queued and the previous ingest keeps running.
    pub fn ingest(&self, records: Vec<Record>) -> Result<IngestHandles> {
        let records = Arc::new(records);

        let index = {
            let (records, indexer) = (Arc::clone(&records), Arc::clone(&self.indexer));
            KeyedTask::new(INGEST_INDEX_KEY, "index-build", TaskPriority::High, move |token| {
                if !token.is_cancelled() {
                    indexer.build_index(&records);
                }
            })
        };

        let columnar = {
            let records = Arc::clone(&records);
            let slot = Arc::clone(&self.columnar);
            let metrics = Arc::clone(&self.metrics);
            let limit = self.config.storage.max_content_bytes;
            KeyedTask::new(
                INGEST_COLUMNAR_KEY,
                "columnar-rebuild",
                TaskPriority::Medium,
                move |token| {
                    let rows: Vec<RowInput> = records
                        .iter()
                        .map(|r| RowInput {
                            id: r.id,
                            title: r.title.clone(),
                            content: r.body.clone(),
                            category: r.category,
                        })
                        .collect();
                    let store = match limit {
                        Some(max) => ColumnarStore::with_content_limit(max),
                        None => ColumnarStore::new(),
                    };
                    if let Err(e) = store.batch_insert(&rows) {
                        warn!(target: "framestore::engine", error = %e, "Columnar rebuild failed");
                        metrics.record_background_failure();
                        return;
                    }
                    if token.is_cancelled() {
                        return;
                    }
                    *slot.write() = Arc::new(store);
                    debug!(target: "framestore::engine", rows = rows.len(), "Columnar store rebuilt");
                },
            )
        };

        let render = {
            let records = Arc::clone(&records);
            let cache = Arc::clone(&self.render_cache);
            let renderer = Arc::clone(&self.renderer);
            let metrics = Arc::clone(&self.metrics);
            KeyedTask::new(INGEST_RENDER_KEY, "pre-render", TaskPriority::Low, move |token| {
                let report = cache.pre_render_records(&records, renderer.as_ref(), token);
                for _ in 0..report.failed {
                    metrics.record_background_failure();
                }
            })
        };

        let stats = {
            let records = Arc::clone(&records);
            let stats = Arc::clone(&self.stats);
            KeyedTask::new(INGEST_STATS_KEY, "stats-warmup", TaskPriority::Low, move |token| {
                for record in records.iter() {
                    if token.is_cancelled() {
                        return;
                    }
                    stats.compute_text(&record.searchable_text());
                }
            })
        };

        let [index, columnar, render, stats] =
            self.scheduler.start_keyed_group([index, columnar, render, stats])?;
        info!(target: "framestore::engine", records = records.len(), "Ingest scheduled");

        Ok(IngestHandles {
            index,
            columnar,
            render,
            stats,
        })
    }

    /// Load every record from `source` and ingest it.
    pub fn refresh_from(&self, source: &dyn RecordSource) -> Result<IngestHandles> {
        let records = source.load_all()?;
        self.ingest(records)
    }

    /// Pre-render a window of rows that are about to become visible.
    ///
    /// Supersedes the previous prefetch; a superseded batch stops storing.
    pub fn prefetch(&self, records: &[Record]) -> Result<TaskHandle> {
        let window: Vec<Record> = records.to_vec();
        let cache = Arc::clone(&self.render_cache);
        let renderer = Arc::clone(&self.renderer);
        let handle = self.scheduler.start_keyed_task(
            PREFETCH_KEY,
            "prefetch",
            TaskPriority::Medium,
            move |token| {
                let report = cache.pre_render_records(&window, renderer.as_ref(), token);
                debug!(
                    target: "framestore::engine",
                    rendered = report.rendered,
                    cancelled = report.cancelled,
                    "Prefetch finished"
                );
            },
        )?;
        Ok(handle)
    }

    // ========================================================================
    // Columnar access
    // ========================================================================

    fn rows(&self) -> Arc<ColumnarStore> {
        self.columnar.read().clone()
    }

    /// Rows in `category`.
    pub fn filter_by_category(&self, category: Category) -> Vec<RowIndex> {
        let started = Instant::now();
        let rows = self.rows().filter_by_category(category);
        self.metrics.finish(Operation::RowAccess, started);
        rows
    }

    /// One row, O(1).
    pub fn fetch_row(&self, row: RowIndex) -> Option<ColumnarRow> {
        self.rows().fetch(row)
    }

    /// Row currently holding `id`.
    pub fn row_of(&self, id: &RecordId) -> Option<RowIndex> {
        self.rows().row_of(id)
    }

    /// Rows whose title or content contains `needle`, case-insensitively.
    pub fn scan_rows(&self, needle: &str) -> Vec<RowIndex> {
        let started = Instant::now();
        let rows = self.rows().search(needle);
        self.metrics.finish(Operation::RowAccess, started);
        rows
    }

    /// Number of live rows
    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    // ========================================================================
    // Memory pressure & observability
    // ========================================================================

    /// Release memory: halve the render cache, compact the index, clear
    /// cached statistics.
    ///
    /// Evicted renders are gone from both tiers. The render cache bound is
    /// restored on the next maintenance tick.
    pub fn handle_memory_pressure(&self) -> PressureReport {
        self.metrics.record_pressure();
        let report = PressureReport {
            render_evicted: self.render_cache.evict_lru(0.5),
            index: self.indexer.compact_index(),
            stats_cleared: self.stats.clear_cache(),
        };
        info!(
            target: "framestore::engine",
            render_evicted = report.render_evicted,
            index_terms_removed = report.index.removed_terms,
            stats_cleared = report.stats_cleared,
            "Memory pressure handled"
        );
        report
    }

    /// Engine counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Render cache counters
    pub fn render_stats(&self) -> RenderCacheStats {
        self.render_cache.stats()
    }

    /// Scheduler counters
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Block until every queued and running background task has ended.
    pub fn wait_for_background(&self) {
        self.scheduler.drain();
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Finish background work, stop threads and flush the update log.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.maintenance.stop();
        self.scheduler.drain();
        self.scheduler.shutdown();
        let flushed = self.wal.flush();
        self.wal.shutdown();
        info!(target: "framestore::engine", "Engine shut down");
        flushed
    }

    /// Whether `shutdown` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(target: "framestore::engine", error = %e, "Shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("data_dir", &self.data_dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}
