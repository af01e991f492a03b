//! Text statistics with chunked byte classification
//!
//! Counting runs over 64-byte chunks. For each chunk four `u64` bitmasks are
//! built (ASCII whitespace, newline, sentence terminator, UTF-8 continuation
//! byte) and reduced with `count_ones`. Word and sentence starts come from
//! shifting a mask by one and carrying the last bit into the next chunk.
//! The remainder shorter than a chunk goes through a scalar loop with the
//! same carry state.

use framestore_core::{Complexity, ContentHash, TextStatistics};
use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const CHUNK: usize = 64;
const WORDS_PER_MINUTE: f64 = 250.0;

/// Terms counted toward the technical-term ratio. Sorted for binary search.
const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "allocator", "api", "array", "async", "backend", "binary", "bitmask", "boolean",
    "buffer", "bytecode", "cache", "callback", "checksum", "compiler", "concurrency", "config",
    "cpu", "database", "deadlock", "debug", "debugger", "deployment", "encryption", "endpoint",
    "function", "hash", "heap", "http", "index", "integer", "interface", "json", "kernel",
    "latency", "library", "memory", "mutex", "parser", "pointer", "protocol", "query", "queue",
    "recursion", "refactor", "regex", "runtime", "schema", "server", "socket", "sql", "stack",
    "string", "struct", "syntax", "thread", "throughput", "token", "variable", "vector",
];

/// Statistics cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Maximum cached entries
    pub cache_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            cache_capacity: 10_000,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ByteCounts {
    words: usize,
    newlines: usize,
    sentences: usize,
    characters: usize,
}

#[inline]
fn is_ws(b: u8) -> bool {
    b.is_ascii_whitespace()
}

#[inline]
fn is_terminator(b: u8) -> bool {
    matches!(b, b'.' | b'!' | b'?')
}

#[inline]
fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Classify one full chunk into (whitespace, newline, terminator, continuation) masks.
#[inline]
fn classify(chunk: &[u8]) -> (u64, u64, u64, u64) {
    let mut ws = 0u64;
    let mut nl = 0u64;
    let mut term = 0u64;
    let mut cont = 0u64;
    for (i, &b) in chunk.iter().enumerate() {
        let bit = 1u64 << i;
        if is_ws(b) {
            ws |= bit;
        }
        if b == b'\n' {
            nl |= bit;
        }
        if is_terminator(b) {
            term |= bit;
        }
        if is_continuation(b) {
            cont |= bit;
        }
    }
    (ws, nl, term, cont)
}

fn count_bytes(bytes: &[u8]) -> ByteCounts {
    let mut counts = ByteCounts::default();
    // Text start behaves like whitespace before it and no terminator.
    let mut prev_ws = 1u64;
    let mut prev_term = 0u64;

    let mut chunks = bytes.chunks_exact(CHUNK);
    for chunk in &mut chunks {
        let (ws, nl, term, cont) = classify(chunk);
        let word_starts = !ws & ((ws << 1) | prev_ws);
        let sentence_starts = term & !((term << 1) | prev_term);

        counts.words += word_starts.count_ones() as usize;
        counts.newlines += nl.count_ones() as usize;
        counts.sentences += sentence_starts.count_ones() as usize;
        counts.characters += CHUNK - cont.count_ones() as usize;

        prev_ws = ws >> 63;
        prev_term = term >> 63;
    }

    let mut prev_ws = prev_ws == 1;
    let mut prev_term = prev_term == 1;
    for &b in chunks.remainder() {
        let ws = is_ws(b);
        let term = is_terminator(b);
        if !ws && prev_ws {
            counts.words += 1;
        }
        if term && !prev_term {
            counts.sentences += 1;
        }
        if b == b'\n' {
            counts.newlines += 1;
        }
        if !is_continuation(b) {
            counts.characters += 1;
        }
        prev_ws = ws;
        prev_term = term;
    }
    counts
}

fn is_technical(word: &str) -> bool {
    TECHNICAL_TERMS.binary_search(&word).is_ok()
}

/// Compute statistics for `text` without caching.
pub fn analyze(text: &str) -> TextStatistics {
    let counts = count_bytes(text.as_bytes());

    let mut unique: FxHashSet<String> = FxHashSet::default();
    let mut word_chars = 0usize;
    let mut technical = 0usize;
    for word in text.split_ascii_whitespace() {
        word_chars += word.chars().count();
        let normalized = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if is_technical(&normalized) {
            technical += 1;
        }
        unique.insert(normalized);
    }

    let words = counts.words;
    let ratio = |n: usize, d: usize| if d == 0 { 0.0 } else { n as f64 / d as f64 };

    TextStatistics {
        word_count: words,
        line_count: if text.is_empty() { 0 } else { counts.newlines + 1 },
        character_count: counts.characters,
        sentence_count: counts.sentences,
        average_word_length: ratio(word_chars, words),
        reading_time_seconds: words as f64 / WORDS_PER_MINUTE * 60.0,
        complexity: Complexity {
            lexical_diversity: ratio(unique.len(), words),
            average_sentence_length: ratio(words, counts.sentences),
            technical_term_ratio: ratio(technical, words),
        },
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsCacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that computed
    pub misses: u64,
    /// Entries currently cached
    pub entries: usize,
}

/// Cached text statistics keyed by content hash.
pub struct StatsComputer {
    cache: Mutex<LruCache<ContentHash, TextStatistics>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatsComputer {
    /// Create a computer with the given cache bound.
    pub fn new(config: StatsConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        StatsComputer {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Statistics for `text`, cached under `key`.
    ///
    /// `key` must be the hash of `text`; the engine always derives it with
    /// [`ContentHash::of_str`].
    pub fn compute(&self, text: &str, key: ContentHash) -> TextStatistics {
        if let Some(stats) = self.get_cached(&key) {
            return stats;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let stats = analyze(text);
        self.cache.lock().put(key, stats);
        stats
    }

    /// Statistics for `text`, hashing it for the cache key.
    pub fn compute_text(&self, text: &str) -> TextStatistics {
        self.compute(text, ContentHash::of_str(text))
    }

    /// Cached statistics, refreshing recency on hit.
    pub fn get_cached(&self, key: &ContentHash) -> Option<TextStatistics> {
        let hit = self.cache.lock().get(key).copied();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Drop every cached entry. Returns how many were dropped.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock();
        let n = cache.len();
        cache.clear();
        debug!(target: "framestore::stats", dropped = n, "Stats cache cleared");
        n
    }

    /// Entries currently cached.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Hit/miss counters.
    pub fn cache_stats(&self) -> StatsCacheStats {
        StatsCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache_len(),
        }
    }
}

impl Default for StatsComputer {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(text: &str) -> ByteCounts {
        let mut sentences = 0;
        let mut prev_term = false;
        for c in text.chars() {
            let term = matches!(c, '.' | '!' | '?');
            if term && !prev_term {
                sentences += 1;
            }
            prev_term = term;
        }
        ByteCounts {
            words: text.split_ascii_whitespace().count(),
            newlines: text.matches('\n').count(),
            sentences,
            characters: text.chars().count(),
        }
    }

    #[test]
    fn test_dictionary_sorted() {
        assert!(TECHNICAL_TERMS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_simple_sentence() {
        let stats = analyze("The quick brown fox. It jumps!");
        assert_eq!(stats.word_count, 6);
        assert_eq!(stats.sentence_count, 2);
        assert_eq!(stats.line_count, 1);
        assert_eq!(stats.character_count, 30);
        assert_eq!(stats.complexity.average_sentence_length, 3.0);
    }

    #[test]
    fn test_empty_text() {
        let stats = analyze("");
        assert_eq!(stats, TextStatistics::default());
    }

    #[test]
    fn test_final_word_without_trailing_space() {
        assert_eq!(analyze("one two three").word_count, 3);
        assert_eq!(analyze("   padded   ").word_count, 1);
    }

    #[test]
    fn test_terminator_runs_count_once() {
        assert_eq!(analyze("Wait... what?!").sentence_count, 2);
    }

    #[test]
    fn test_lines_and_reading_time() {
        let text = "line one\nline two\nline three";
        let stats = analyze(text);
        assert_eq!(stats.line_count, 3);
        let words = "word ".repeat(250);
        assert!((analyze(&words).reading_time_seconds - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_multibyte_characters() {
        let stats = analyze("日本語 テキスト 🚀");
        assert_eq!(stats.character_count, 10);
        assert_eq!(stats.word_count, 3);
    }

    #[test]
    fn test_chunk_boundaries_match_naive() {
        // Lengths straddle the 64-byte chunk edge with words crossing it.
        let base = "alpha beta. gamma!! délta\nepsilon? zeta ";
        for n in 0..200 {
            let text: String = base.chars().cycle().take(n).collect();
            assert_eq!(count_bytes(text.as_bytes()), naive(&text), "length {n}");
        }
    }

    #[test]
    fn test_technical_ratio_and_diversity() {
        let stats = analyze("Cache the cache, mutex!");
        assert_eq!(stats.word_count, 4);
        assert!((stats.complexity.technical_term_ratio - 0.75).abs() < 1e-9);
        assert!((stats.complexity.lexical_diversity - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_cache_hits_and_clear() {
        let computer = StatsComputer::default();
        let text = "some text to measure";
        let first = computer.compute_text(text);
        let second = computer.compute_text(text);
        assert_eq!(first, second);
        let counters = computer.cache_stats();
        assert_eq!(counters.hits, 1);
        assert_eq!(counters.misses, 1);
        assert_eq!(computer.clear_cache(), 1);
        assert!(computer.get_cached(&ContentHash::of_str(text)).is_none());
    }

    #[test]
    fn test_cache_is_bounded() {
        let computer = StatsComputer::new(StatsConfig { cache_capacity: 3 });
        for i in 0..10 {
            computer.compute_text(&format!("text {i}"));
        }
        assert_eq!(computer.cache_len(), 3);
    }
}
