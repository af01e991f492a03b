//! Two-tier cache of rendered output
//!
//! The hot tier is an in-memory LRU keyed by the content hash of the source
//! text. The optional warm tier keeps one file per hash on disk so renders
//! survive a restart; a warm hit is promoted back into memory.
//!
//! ## Disk Entry Format
//!
//! ```text
//! <dir>/<first 2 hex>/<hex>.rout
//!
//!   magic "FSRO"     4B
//!   body_crc32       u32 LE
//!   body             MessagePack(RenderedOutput)
//! ```
//!
//! A disk entry that fails any check is logged, deleted and treated as a miss.
//!
//! Ordinary LRU overflow only drops the hot copy. `evict_lru` also deletes
//! the disk entries of what it evicts, so an entry released under memory
//! pressure cannot be promoted back.

use crate::background::CancellationToken;
use crate::render::{render_for_category, Renderer};
use byteorder::{ByteOrder, LittleEndian};
use framestore_core::{ContentHash, Error, Record, RenderedOutput, Result};
use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Disk entry magic
pub const RENDER_MAGIC: &[u8; 4] = b"FSRO";
/// Disk entry file extension
pub const RENDER_EXTENSION: &str = "rout";

const ENTRY_HEADER_SIZE: usize = 8;

// ============================================================================
// Configuration
// ============================================================================

/// Render settings (`[render]` in `framestore.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderCacheConfig {
    /// Hot-tier entry bound
    pub capacity: usize,
    /// Keep rendered output on disk as well
    pub disk_tier: bool,
    /// Sources up to this size render inline on a miss
    pub inline_render_bytes: usize,
    /// Characters kept in a placeholder
    pub placeholder_chars: usize,
    /// fsync disk entries after writing
    pub sync_writes: bool,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        RenderCacheConfig {
            capacity: 1000,
            disk_tier: true,
            inline_render_bytes: 16 * 1024,
            placeholder_chars: 200,
            sync_writes: false,
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of a pre-render batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Inputs submitted
    pub requested: usize,
    /// Inputs already cached and skipped
    pub already_cached: usize,
    /// Renders stored
    pub rendered: usize,
    /// Renders that failed
    pub failed: usize,
    /// Inputs abandoned after cancellation
    pub skipped: usize,
    /// Whether the batch observed cancellation
    pub cancelled: bool,
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCacheStats {
    /// Served from memory
    pub hot_hits: u64,
    /// Served from disk and promoted
    pub disk_hits: u64,
    /// Not cached anywhere
    pub misses: u64,
    /// Disk entries found damaged and deleted
    pub corrupt_entries: u64,
    /// Entries currently in memory
    pub entries: usize,
    /// Current hot-tier bound
    pub capacity: usize,
}

// ============================================================================
// RenderCache
// ============================================================================

/// Rendered output keyed by the hash of its source.
pub struct RenderCache {
    hot: Mutex<LruCache<ContentHash, RenderedOutput>>,
    disk_dir: Option<PathBuf>,
    config: RenderCacheConfig,
    hot_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    corrupt_entries: AtomicU64,
}

impl RenderCache {
    /// Memory-only cache.
    pub fn in_memory(config: RenderCacheConfig) -> Self {
        Self::build(None, config)
    }

    /// Cache with a disk tier under `dir` (when enabled in `config`).
    pub fn open(dir: impl Into<PathBuf>, config: RenderCacheConfig) -> Result<Self> {
        let disk_dir = if config.disk_tier {
            let dir = dir.into();
            fs::create_dir_all(&dir)?;
            Some(dir)
        } else {
            None
        };
        Ok(Self::build(disk_dir, config))
    }

    fn build(disk_dir: Option<PathBuf>, config: RenderCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        RenderCache {
            hot: Mutex::new(LruCache::new(capacity)),
            disk_dir,
            config,
            hot_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corrupt_entries: AtomicU64::new(0),
        }
    }

    /// Settings this cache was built with
    pub fn config(&self) -> &RenderCacheConfig {
        &self.config
    }

    /// Disk tier directory, if any
    pub fn disk_dir(&self) -> Option<&Path> {
        self.disk_dir.as_deref()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Cached output for `source`.
    pub fn get(&self, source: &str) -> Option<RenderedOutput> {
        self.get_by_key(&ContentHash::of_str(source))
    }

    /// Cached output under a precomputed key.
    pub fn get_by_key(&self, key: &ContentHash) -> Option<RenderedOutput> {
        if let Some(hit) = self.hot.lock().get(key).cloned() {
            self.hot_hits.fetch_add(1, Ordering::Relaxed);
            return Some(hit);
        }
        match self.read_disk(key) {
            Some(output) => {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                self.hot.lock().put(*key, output.clone());
                Some(output)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether `source` is in the hot tier. Does not touch recency.
    pub fn contains_hot(&self, source: &str) -> bool {
        self.hot.lock().contains(&ContentHash::of_str(source))
    }

    /// Whether `key` is cached in either tier.
    pub fn contains_key(&self, key: &ContentHash) -> bool {
        if self.hot.lock().contains(key) {
            return true;
        }
        self.entry_path(key).map(|p| p.exists()).unwrap_or(false)
    }

    // ========================================================================
    // Store
    // ========================================================================

    /// Cache `output` for `source`. Placeholders are ignored.
    ///
    /// # Errors
    ///
    /// I/O or encoding failure writing the disk entry. The hot tier is
    /// updated regardless.
    pub fn store(&self, source: &str, output: RenderedOutput) -> Result<()> {
        self.store_by_key(ContentHash::of_str(source), output)
    }

    /// Cache `output` under a precomputed key. Placeholders are ignored.
    pub fn store_by_key(&self, key: ContentHash, output: RenderedOutput) -> Result<()> {
        if output.is_placeholder {
            return Ok(());
        }
        if let Some(path) = self.entry_path(&key) {
            self.hot.lock().put(key, output.clone());
            self.write_disk(&path, &output)
        } else {
            self.hot.lock().put(key, output);
            Ok(())
        }
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Shrink the hot tier to `max(1, round(capacity × keep_ratio))` and
    /// delete the disk entries of everything evicted.
    ///
    /// The bound stays reduced until [`reset_capacity`](Self::reset_capacity).
    /// Returns how many entries were dropped.
    pub fn evict_lru(&self, keep_ratio: f64) -> usize {
        let ratio = if keep_ratio.is_nan() { 0.0 } else { keep_ratio.clamp(0.0, 1.0) };
        let (evicted, target) = {
            let mut hot = self.hot.lock();
            let target = ((hot.cap().get() as f64) * ratio).round() as usize;
            let target = NonZeroUsize::new(target).unwrap_or(NonZeroUsize::MIN);
            let mut evicted = Vec::with_capacity(hot.len().saturating_sub(target.get()));
            while hot.len() > target.get() {
                match hot.pop_lru() {
                    Some((key, _)) => evicted.push(key),
                    None => break,
                }
            }
            hot.resize(target);
            (evicted, target)
        };

        let mut purged = 0;
        for key in &evicted {
            let Some(path) = self.entry_path(key) else { break };
            match fs::remove_file(&path) {
                Ok(()) => purged += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(target: "framestore::render", path = %path.display(), error = %e, "Could not purge evicted render entry");
                }
            }
        }
        debug!(
            target: "framestore::render",
            evicted = evicted.len(),
            purged,
            capacity = target.get(),
            "Render cache shrunk"
        );
        evicted.len()
    }

    /// Restore the configured hot-tier bound.
    ///
    /// Returns whether the bound had been reduced.
    pub fn reset_capacity(&self) -> bool {
        let capacity = NonZeroUsize::new(self.config.capacity).unwrap_or(NonZeroUsize::MIN);
        let mut hot = self.hot.lock();
        if hot.cap() == capacity {
            return false;
        }
        hot.resize(capacity);
        true
    }

    /// Entries in the hot tier
    pub fn len(&self) -> usize {
        self.hot.lock().len()
    }

    /// Whether the hot tier is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current hot-tier bound
    pub fn capacity(&self) -> usize {
        self.hot.lock().cap().get()
    }

    /// Drop every hot entry. Disk entries stay.
    pub fn clear(&self) {
        self.hot.lock().clear();
    }

    /// Counter snapshot
    pub fn stats(&self) -> RenderCacheStats {
        let hot = self.hot.lock();
        RenderCacheStats {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            entries: hot.len(),
            capacity: hot.cap().get(),
        }
    }

    // ========================================================================
    // Batch pre-rendering
    // ========================================================================

    /// Render every uncached text in parallel and store each as it finishes.
    ///
    /// A failed render is logged and counted. Once `cancel` fires no further
    /// results are stored.
    pub fn pre_render_batch<S>(
        &self,
        texts: &[S],
        renderer: &dyn Renderer,
        cancel: &CancellationToken,
    ) -> BatchReport
    where
        S: AsRef<str> + Sync,
    {
        self.run_batch(
            texts,
            |text| ContentHash::of_str(text.as_ref()),
            |text| renderer.render(text.as_ref()),
            cancel,
        )
    }

    /// Category-aware variant of [`pre_render_batch`](Self::pre_render_batch).
    pub fn pre_render_records(
        &self,
        records: &[Record],
        renderer: &dyn Renderer,
        cancel: &CancellationToken,
    ) -> BatchReport {
        self.run_batch(
            records,
            record_key,
            |r| render_for_category(renderer, r.category, &r.title, &r.body),
            cancel,
        )
    }

    fn run_batch<T, K, R>(
        &self,
        items: &[T],
        key_of: K,
        render: R,
        cancel: &CancellationToken,
    ) -> BatchReport
    where
        T: Sync,
        K: Fn(&T) -> ContentHash + Sync,
        R: Fn(&T) -> Result<String> + Sync,
    {
        let pending: Vec<(ContentHash, &T)> = items
            .iter()
            .map(|item| (key_of(item), item))
            .filter(|(key, _)| !self.contains_key(key))
            .collect();

        let rendered = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);

        pending.par_iter().for_each(|(key, item)| {
            if cancel.is_cancelled() {
                skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let started = Instant::now();
            let content = match render(item) {
                Ok(content) => content,
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "framestore::render", key = ?key, error = %e, "Pre-render failed");
                    return;
                }
            };
            // Checked again so a cancelled batch never stores a late result.
            if cancel.is_cancelled() {
                skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let output = RenderedOutput::complete(content, started.elapsed().as_secs_f64());
            match self.store_by_key(*key, output) {
                Ok(()) => {
                    rendered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "framestore::render", key = ?key, error = %e, "Storing render failed");
                }
            }
        });

        let report = BatchReport {
            requested: items.len(),
            already_cached: items.len() - pending.len(),
            rendered: rendered.into_inner(),
            failed: failed.into_inner(),
            skipped: skipped.into_inner(),
            cancelled: cancel.is_cancelled(),
        };
        debug!(
            target: "framestore::render",
            requested = report.requested,
            rendered = report.rendered,
            failed = report.failed,
            skipped = report.skipped,
            "Pre-render batch finished"
        );
        report
    }

    // ========================================================================
    // Disk tier
    // ========================================================================

    fn entry_path(&self, key: &ContentHash) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| {
            let hex = key.to_hex();
            dir.join(&hex[..2]).join(format!("{}.{}", hex, RENDER_EXTENSION))
        })
    }

    fn write_disk(&self, path: &Path, output: &RenderedOutput) -> Result<()> {
        let body = rmp_serde::to_vec(output).map_err(|e| Error::encoding(e.to_string()))?;
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        header[0..4].copy_from_slice(RENDER_MAGIC);
        LittleEndian::write_u32(&mut header[4..8], crc32fast::hash(&body));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("{}.tmp", RENDER_EXTENSION));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&header)?;
            file.write_all(&body)?;
            if self.config.sync_writes {
                file.sync_data()?;
            }
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_disk(&self, key: &ContentHash) -> Option<RenderedOutput> {
        let path = self.entry_path(key)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(target: "framestore::render", path = %path.display(), error = %e, "Render entry unreadable");
                return None;
            }
        };
        match map_and_decode(&file) {
            Ok(output) => Some(output),
            Err(e) => {
                self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
                warn!(target: "framestore::render", path = %path.display(), error = %e, "Deleting corrupted render entry");
                if let Err(e) = fs::remove_file(&path) {
                    warn!(target: "framestore::render", path = %path.display(), error = %e, "Could not delete render entry");
                }
                None
            }
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::in_memory(RenderCacheConfig::default())
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("disk_dir", &self.disk_dir)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cache key for a category-aware record render.
pub fn record_key(record: &Record) -> ContentHash {
    let mut source = String::with_capacity(record.title.len() + record.body.len() + 16);
    source.push_str(record.category.as_str());
    source.push('\0');
    source.push_str(&record.title);
    source.push('\0');
    source.push_str(&record.body);
    ContentHash::of_str(&source)
}

fn map_and_decode(file: &File) -> Result<RenderedOutput> {
    let len = file.metadata()?.len() as usize;
    if len < ENTRY_HEADER_SIZE {
        return Err(Error::corrupted(format!("render entry too small: {} bytes", len)));
    }
    // SAFETY: entries are written once through rename and never modified in
    // place; a concurrent delete leaves an existing map valid.
    let mmap = unsafe { memmap2::Mmap::map(file)? };
    decode_entry(&mmap)
}

fn decode_entry(bytes: &[u8]) -> Result<RenderedOutput> {
    if bytes.len() < ENTRY_HEADER_SIZE || &bytes[0..4] != RENDER_MAGIC {
        return Err(Error::corrupted("render entry magic mismatch"));
    }
    let stored = LittleEndian::read_u32(&bytes[4..8]);
    let body = &bytes[ENTRY_HEADER_SIZE..];
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(Error::corrupted(format!(
            "render entry crc mismatch: stored {:08x}, computed {:08x}",
            stored, computed
        )));
    }
    rmp_serde::from_slice(body).map_err(|e| Error::corrupted(format!("render entry body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MarkdownRenderer;
    use framestore_core::Category;
    use tempfile::TempDir;

    struct FailOn(&'static str);

    impl Renderer for FailOn {
        fn render(&self, source: &str) -> Result<String> {
            if source.contains(self.0) {
                Err(Error::encoding("refused"))
            } else {
                Ok(source.to_uppercase())
            }
        }
    }

    fn small(capacity: usize) -> RenderCache {
        RenderCache::in_memory(RenderCacheConfig {
            capacity,
            ..RenderCacheConfig::default()
        })
    }

    fn entry_files(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for shard in fs::read_dir(dir).unwrap() {
            for f in fs::read_dir(shard.unwrap().path()).unwrap() {
                out.push(f.unwrap().path());
            }
        }
        out
    }

    #[test]
    fn test_store_then_get() {
        let cache = small(4);
        let out = RenderedOutput::complete("<p>x</p>".into(), 0.001);
        cache.store("x", out.clone()).unwrap();
        assert_eq!(cache.get("x"), Some(out));
        assert!(cache.contains_hot("x"));
        assert_eq!(cache.get("y"), None);
        let stats = cache.stats();
        assert_eq!((stats.hot_hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_placeholder_never_stored() {
        let cache = small(4);
        cache.store("x", RenderedOutput::placeholder("x".into())).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get("x"), None);
    }

    #[test]
    fn test_lru_bound_and_recency() {
        let cache = small(2);
        for s in ["a", "b"] {
            cache.store(s, RenderedOutput::complete(s.into(), 0.0)).unwrap();
        }
        assert!(cache.get("a").is_some());
        cache.store("c", RenderedOutput::complete("c".into(), 0.0)).unwrap();
        assert!(cache.contains_hot("a"));
        assert!(!cache.contains_hot("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_evict_lru_halves_full_cache() {
        let cache = small(7);
        for i in 0..7 {
            let s = i.to_string();
            cache.store(&s, RenderedOutput::complete(s.clone(), 0.0)).unwrap();
        }
        let evicted = cache.evict_lru(0.5);
        assert_eq!(evicted, 3);
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.capacity(), 4);
        // Most recent survive.
        assert!(cache.contains_hot("6"));
        assert!(!cache.contains_hot("0"));

        assert_eq!(cache.evict_lru(0.0), 3);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.reset_capacity());
        assert_eq!(cache.capacity(), 7);
        assert!(!cache.reset_capacity());
    }

    #[test]
    fn test_evict_lru_purges_disk_entries() {
        let dir = TempDir::new().unwrap();
        let config = RenderCacheConfig {
            capacity: 16,
            ..RenderCacheConfig::default()
        };
        let cache = RenderCache::open(dir.path(), config).unwrap();
        let sources: Vec<String> = (0..16).map(|i| format!("source {i}")).collect();
        for s in &sources {
            cache.store(s, RenderedOutput::complete(s.to_uppercase(), 0.0)).unwrap();
        }
        assert_eq!(entry_files(dir.path()).len(), 16);

        assert_eq!(cache.evict_lru(0.5), 8);
        assert_eq!(entry_files(dir.path()).len(), 8);

        let retrievable = sources.iter().filter(|s| cache.get(s).is_some()).count();
        assert_eq!(retrievable, 8);
        assert!(cache.get("source 0").is_none());
        assert!(cache.get("source 15").is_some());
    }

    #[test]
    fn test_overflow_keeps_disk_copy() {
        let dir = TempDir::new().unwrap();
        let config = RenderCacheConfig {
            capacity: 1,
            ..RenderCacheConfig::default()
        };
        let cache = RenderCache::open(dir.path(), config).unwrap();
        cache.store("a", RenderedOutput::complete("A".into(), 0.0)).unwrap();
        cache.store("b", RenderedOutput::complete("B".into(), 0.0)).unwrap();
        assert!(!cache.contains_hot("a"));
        assert_eq!(cache.get("a").map(|o| o.content), Some("A".to_string()));
        assert_eq!(cache.stats().disk_hits, 1);
    }

    #[test]
    fn test_disk_tier_survives_reopen_and_promotes() {
        let dir = TempDir::new().unwrap();
        let out = RenderedOutput::complete("<h1>t</h1>".into(), 0.01);
        {
            let cache = RenderCache::open(dir.path(), RenderCacheConfig::default()).unwrap();
            cache.store("# t", out.clone()).unwrap();
        }
        let cache = RenderCache::open(dir.path(), RenderCacheConfig::default()).unwrap();
        assert!(!cache.contains_hot("# t"));
        assert_eq!(cache.get("# t"), Some(out));
        assert!(cache.contains_hot("# t"));
        assert_eq!(cache.stats().disk_hits, 1);
    }

    #[test]
    fn test_corrupted_disk_entry_deleted() {
        let dir = TempDir::new().unwrap();
        {
            let cache = RenderCache::open(dir.path(), RenderCacheConfig::default()).unwrap();
            cache.store("src", RenderedOutput::complete("out".into(), 0.0)).unwrap();
        }
        let files = entry_files(dir.path());
        assert_eq!(files.len(), 1);
        let mut bytes = fs::read(&files[0]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&files[0], bytes).unwrap();

        let cache = RenderCache::open(dir.path(), RenderCacheConfig::default()).unwrap();
        assert_eq!(cache.get("src"), None);
        assert!(!files[0].exists());
        assert_eq!(cache.stats().corrupt_entries, 1);
    }

    #[test]
    fn test_truncated_disk_entry_is_miss() {
        let dir = TempDir::new().unwrap();
        let cache = RenderCache::open(dir.path(), RenderCacheConfig::default()).unwrap();
        cache.store("src", RenderedOutput::complete("out".into(), 0.0)).unwrap();
        cache.clear();
        let files = entry_files(dir.path());
        fs::write(&files[0], b"FS").unwrap();
        assert_eq!(cache.get("src"), None);
    }

    #[test]
    fn test_batch_counts_failures_without_aborting() {
        let cache = small(16);
        let texts = vec!["ok one", "bad two", "ok three"];
        let report = cache.pre_render_batch(&texts, &FailOn("bad"), &CancellationToken::new());
        assert_eq!(report.requested, 3);
        assert_eq!(report.rendered, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.cancelled);
        assert_eq!(cache.get("ok one").map(|o| o.content), Some("OK ONE".to_string()));

        let again = cache.pre_render_batch(&texts, &FailOn("bad"), &CancellationToken::new());
        assert_eq!(again.already_cached, 2);
        assert_eq!(again.rendered, 0);
    }

    #[test]
    fn test_cancelled_batch_stores_nothing() {
        let cache = small(16);
        let token = CancellationToken::new();
        token.cancel();
        let texts: Vec<String> = (0..20).map(|i| format!("text {i}")).collect();
        let report = cache.pre_render_batch(&texts, &MarkdownRenderer, &token);
        assert!(report.cancelled);
        assert_eq!(report.rendered, 0);
        assert_eq!(report.skipped, 20);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_batch_is_category_aware() {
        let cache = small(16);
        let code = Record::new("snippet", "# not a heading", Category::Code);
        let note = Record::new("note", "# heading", Category::Note);
        let report =
            cache.pre_render_records(&[code.clone(), note.clone()], &MarkdownRenderer, &CancellationToken::new());
        assert_eq!(report.rendered, 2);
        assert!(cache.get_by_key(&record_key(&code)).unwrap().content.starts_with("<pre>"));
        assert!(cache.get_by_key(&record_key(&note)).unwrap().content.starts_with("<h1>"));
    }

    #[test]
    fn test_record_key_depends_on_category() {
        let a = Record::new("t", "b", Category::Note);
        let mut b = a.clone();
        b.category = Category::Code;
        assert_ne!(record_key(&a), record_key(&b));
    }
}
