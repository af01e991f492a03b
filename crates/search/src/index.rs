//! Inverted + trigram text index
//!
//! This module provides:
//! - TextIndexer with an atomically swapped immutable snapshot
//! - Parallel batch build with a serialized merge
//! - TF-IDF scoring with fuzzy expansion through trigrams
//! - Copy-modify-swap compaction
//!
//! # Snapshot Model
//!
//! Readers clone an `Arc<IndexSnapshot>` under a short read lock and score
//! against it without holding any lock. A build or compaction produces a
//! complete new snapshot and replaces the `Arc` in one write. A search
//! therefore sees the old index or the new one, never a half-merged state.
//!
//! # Doc IDs
//!
//! A document id is the record's position in the slice passed to
//! `build_index`. Ties in score keep ascending doc id order.

use crate::highlight::{highlight_ranges, preview_text};
use crate::tokenizer::{tokenize, tokenize_unique};
use crate::trigram::{jaccard, trigrams, Trigram};
use framestore_core::{Record, RecordId, SearchResult};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Dense document identifier
pub type DocId = u32;
/// Dense term identifier
pub type TermId = u32;

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for the text index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Records per parallel build batch
    pub batch_size: usize,
    /// Body characters included in the highlight preview
    pub preview_chars: usize,
    /// Minimum trigram Jaccard similarity for fuzzy expansion
    pub fuzzy_threshold: f64,
    /// Postings below this size are dropped by `compact_index`
    pub min_postings: usize,
    /// Multiplier when the literal query phrase occurs in the document
    pub phrase_boost: f64,
    /// Multiplier per query token among the leading tokens
    pub leading_boost: f64,
    /// How many leading tokens count for `leading_boost`
    pub leading_tokens: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            batch_size: 512,
            preview_chars: 200,
            fuzzy_threshold: 0.3,
            min_postings: 2,
            phrase_boost: 2.0,
            leading_boost: 1.5,
            leading_tokens: 10,
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Entry in a posting list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Document containing the term
    pub doc: DocId,
    /// Occurrences of the term in the document
    pub tf: u32,
}

#[derive(Debug, Clone)]
struct DocMeta {
    record_id: RecordId,
    len: u32,
    leading: SmallVec<[TermId; 10]>,
}

/// Immutable index state shared by all concurrent searches.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    terms: Vec<String>,
    term_ids: FxHashMap<String, TermId>,
    /// By term id, ascending doc order
    postings: Vec<Vec<Posting>>,
    /// Vocabulary trigram map for fuzzy expansion
    term_grams: FxHashMap<Trigram, Vec<TermId>>,
    /// Document trigram map, ascending doc order
    doc_grams: FxHashMap<Trigram, Vec<DocId>>,
    docs: Vec<DocMeta>,
    doc_of: FxHashMap<RecordId, DocId>,
}

impl IndexSnapshot {
    /// Documents indexed
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Terms with a non-empty posting list
    pub fn term_count(&self) -> usize {
        self.term_ids.len()
    }

    /// Postings for a normalized term
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.term_ids
            .get(term)
            .map(|&t| self.postings[t as usize].as_slice())
            .unwrap_or(&[])
    }

    /// Documents containing `gram`
    pub fn docs_with_trigram(&self, gram: &Trigram) -> &[DocId] {
        self.doc_grams.get(gram).map(Vec::as_slice).unwrap_or(&[])
    }

    fn idf(&self, df: usize) -> f64 {
        if df == 0 {
            return 0.0;
        }
        (1.0 + self.docs.len() as f64 / df as f64).ln()
    }

    /// Vocabulary terms similar to `token`, excluding the token itself.
    fn expand(&self, token: &str, threshold: f64) -> Vec<(TermId, f64)> {
        let grams = trigrams(token);
        let mut shared: FxHashMap<TermId, usize> = FxHashMap::default();
        for gram in &grams {
            if let Some(ids) = self.term_grams.get(gram) {
                for &id in ids {
                    *shared.entry(id).or_insert(0) += 1;
                }
            }
        }
        let exact = self.term_ids.get(token).copied();
        let mut out: Vec<(TermId, f64)> = shared
            .into_iter()
            .filter(|(id, _)| Some(*id) != exact)
            .filter_map(|(id, n)| {
                let term_grams = trigrams(&self.terms[id as usize]).len();
                let sim = jaccard(n, grams.len(), term_grams);
                (sim >= threshold).then_some((id, sim))
            })
            .collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    /// Documents sharing at least `threshold` of the token's trigrams.
    fn fuzzy_docs(&self, token: &str, threshold: f64) -> FxHashSet<DocId> {
        let grams = trigrams(token);
        let needed = ((grams.len() as f64) * threshold).ceil().max(1.0) as usize;
        let mut counts: FxHashMap<DocId, usize> = FxHashMap::default();
        for gram in &grams {
            for &doc in self.docs_with_trigram(gram) {
                *counts.entry(doc).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n >= needed)
            .map(|(doc, _)| doc)
            .collect()
    }
}

// ============================================================================
// Build
// ============================================================================

/// Private per-batch maps produced in parallel.
struct BatchIndex {
    postings: FxHashMap<String, Vec<Posting>>,
    grams: FxHashMap<Trigram, Vec<DocId>>,
    docs: Vec<(RecordId, u32, Vec<String>)>,
}

fn index_batch(first_doc: DocId, records: &[Record], leading_tokens: usize) -> BatchIndex {
    let mut batch = BatchIndex {
        postings: FxHashMap::default(),
        grams: FxHashMap::default(),
        docs: Vec::with_capacity(records.len()),
    };
    for (offset, record) in records.iter().enumerate() {
        let doc = first_doc + offset as DocId;
        let tokens = tokenize(&record.searchable_text());

        let mut tf: FxHashMap<&str, u32> = FxHashMap::default();
        for token in &tokens {
            *tf.entry(token.as_str()).or_insert(0) += 1;
        }
        let mut doc_grams: FxHashSet<Trigram> = FxHashSet::default();
        for (term, count) in tf {
            doc_grams.extend(trigrams(term));
            batch
                .postings
                .entry(term.to_string())
                .or_default()
                .push(Posting { doc, tf: count });
        }
        for gram in doc_grams {
            batch.grams.entry(gram).or_default().push(doc);
        }

        let leading = tokens.iter().take(leading_tokens).cloned().collect();
        batch.docs.push((record.id, tokens.len() as u32, leading));
    }
    batch
}

fn merge_batches(batches: Vec<BatchIndex>) -> IndexSnapshot {
    let mut snap = IndexSnapshot::default();
    let mut leading_terms: Vec<Vec<String>> = Vec::new();

    for batch in batches {
        for (term, postings) in batch.postings {
            let id = match snap.term_ids.get(&term) {
                Some(&id) => id,
                None => {
                    let id = snap.terms.len() as TermId;
                    snap.terms.push(term.clone());
                    snap.term_ids.insert(term, id);
                    snap.postings.push(Vec::new());
                    id
                }
            };
            snap.postings[id as usize].extend(postings);
        }
        for (gram, docs) in batch.grams {
            snap.doc_grams.entry(gram).or_default().extend(docs);
        }
        for (record_id, len, leading) in batch.docs {
            let doc = snap.docs.len() as DocId;
            snap.doc_of.insert(record_id, doc);
            snap.docs.push(DocMeta {
                record_id,
                len,
                leading: SmallVec::new(),
            });
            leading_terms.push(leading);
        }
    }

    // Batches arrive in doc order but each batch's map iterates arbitrarily.
    for list in &mut snap.postings {
        list.sort_unstable_by_key(|p| p.doc);
    }
    for list in snap.doc_grams.values_mut() {
        list.sort_unstable();
    }
    for (meta, leading) in snap.docs.iter_mut().zip(leading_terms) {
        meta.leading = leading
            .iter()
            .filter_map(|t| snap.term_ids.get(t).copied())
            .collect();
    }
    for (id, term) in snap.terms.iter().enumerate() {
        for gram in trigrams(term) {
            snap.term_grams.entry(gram).or_default().push(id as TermId);
        }
    }
    snap
}

// ============================================================================
// Reports
// ============================================================================

/// Counters describing the current snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Documents indexed
    pub documents: usize,
    /// Distinct terms
    pub terms: usize,
    /// Distinct document trigrams
    pub trigrams: usize,
    /// Total postings across all terms
    pub postings: usize,
    /// Completed builds since creation
    pub builds: u64,
}

/// What `compact_index` removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Terms whose posting list fell below the minimum
    pub removed_terms: usize,
    /// Document trigrams whose set fell below the minimum
    pub removed_trigrams: usize,
    /// Terms left after compaction
    pub remaining_terms: usize,
}

// ============================================================================
// TextIndexer
// ============================================================================

/// Full-text index over record titles and bodies.
pub struct TextIndexer {
    config: IndexConfig,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Serializes builds and compactions
    writer: Mutex<()>,
    builds: AtomicU64,
}

impl TextIndexer {
    /// Create an empty index.
    pub fn new(config: IndexConfig) -> Self {
        TextIndexer {
            config,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(()),
            builds: AtomicU64::new(0),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Current snapshot; cheap to clone and safe to hold across a rebuild.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the index with one built from `records`.
    pub fn build_index(&self, records: &[Record]) -> IndexStats {
        let _guard = self.writer.lock();
        let start = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let leading = self.config.leading_tokens;

        let batches: Vec<BatchIndex> = records
            .par_chunks(batch_size)
            .enumerate()
            .map(|(i, chunk)| index_batch((i * batch_size) as DocId, chunk, leading))
            .collect();
        let snap = merge_batches(batches);

        *self.snapshot.write() = Arc::new(snap);
        self.builds.fetch_add(1, Ordering::Relaxed);
        let stats = self.stats();
        info!(
            target: "framestore::search",
            documents = stats.documents,
            terms = stats.terms,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Index built"
        );
        stats
    }

    /// Rank `records` against `query`.
    ///
    /// Only records that are both indexed and present in `records` can be
    /// returned. Scores are always positive.
    pub fn search(&self, query: &str, records: &[Record]) -> Vec<SearchResult> {
        let tokens = tokenize_unique(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let snap = self.snapshot();
        if snap.docs.is_empty() {
            return Vec::new();
        }

        let allowed: FxHashMap<DocId, usize> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| snap.doc_of.get(&r.id).map(|&doc| (doc, i)))
            .collect();
        if allowed.is_empty() {
            return Vec::new();
        }

        let threshold = self.config.fuzzy_threshold;
        let mut scores: BTreeMap<DocId, f64> = BTreeMap::new();
        let mut highlight_terms: Vec<String> = tokens.clone();

        for token in &tokens {
            let mut exact_docs: FxHashSet<DocId> = FxHashSet::default();
            let exact = snap.postings(token);
            let idf = snap.idf(exact.len());
            for p in exact {
                if !allowed.contains_key(&p.doc) {
                    continue;
                }
                let len = snap.docs[p.doc as usize].len.max(1) as f64;
                *scores.entry(p.doc).or_insert(0.0) += p.tf as f64 / len * idf;
                exact_docs.insert(p.doc);
            }

            let expansions = snap.expand(token, threshold);
            if expansions.is_empty() {
                continue;
            }
            let fuzzy_docs = snap.fuzzy_docs(token, threshold);
            let mut best: FxHashMap<DocId, f64> = FxHashMap::default();
            for &(term, sim) in &expansions {
                let postings = &snap.postings[term as usize];
                let idf = snap.idf(postings.len());
                let mut used = false;
                for p in postings {
                    if exact_docs.contains(&p.doc)
                        || !fuzzy_docs.contains(&p.doc)
                        || !allowed.contains_key(&p.doc)
                    {
                        continue;
                    }
                    let len = snap.docs[p.doc as usize].len.max(1) as f64;
                    let contribution = p.tf as f64 / len * idf * sim;
                    let slot = best.entry(p.doc).or_insert(0.0);
                    *slot = slot.max(contribution);
                    used = true;
                }
                if used {
                    highlight_terms.push(snap.terms[term as usize].clone());
                }
            }
            for (doc, contribution) in best {
                *scores.entry(doc).or_insert(0.0) += contribution;
            }
        }

        let phrase = PhraseMatcher::new(query.trim());
        let token_ids: Vec<TermId> = tokens
            .iter()
            .filter_map(|t| snap.term_ids.get(t).copied())
            .collect();

        let mut ranked: Vec<(DocId, f64)> = scores
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .map(|(doc, mut score)| {
                let record = &records[allowed[&doc]];
                if phrase.as_ref().is_some_and(|p| p.matches(record)) {
                    score *= self.config.phrase_boost;
                }
                let leading = &snap.docs[doc as usize].leading;
                for id in &token_ids {
                    if leading.contains(id) {
                        score *= self.config.leading_boost;
                    }
                }
                (doc, score)
            })
            .collect();
        // Stable: equal scores keep ascending doc order.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results: Vec<SearchResult> = ranked
            .into_iter()
            .map(|(doc, score)| {
                let record = &records[allowed[&doc]];
                let preview = preview_text(record, self.config.preview_chars);
                SearchResult {
                    record_id: snap.docs[doc as usize].record_id,
                    score: score as f32,
                    highlights: highlight_ranges(&preview, &highlight_terms),
                }
            })
            .collect();
        debug!(
            target: "framestore::search",
            query,
            hits = results.len(),
            candidates = records.len(),
            "Search"
        );
        results
    }

    /// Drop terms and trigrams whose posting sets are below `min_postings`.
    pub fn compact_index(&self) -> CompactionReport {
        let _guard = self.writer.lock();
        let min = self.config.min_postings;
        let mut snap = (*self.snapshot()).clone();

        let doomed: FxHashSet<TermId> = snap
            .term_ids
            .values()
            .copied()
            .filter(|&id| snap.postings[id as usize].len() < min)
            .collect();
        for &id in &doomed {
            let term = std::mem::take(&mut snap.terms[id as usize]);
            snap.term_ids.remove(&term);
            snap.postings[id as usize] = Vec::new();
        }
        snap.term_grams.retain(|_, ids| {
            ids.retain(|id| !doomed.contains(id));
            !ids.is_empty()
        });
        for meta in &mut snap.docs {
            meta.leading.retain(|id| !doomed.contains(&*id));
        }

        let before = snap.doc_grams.len();
        snap.doc_grams.retain(|_, docs| docs.len() >= min);
        let report = CompactionReport {
            removed_terms: doomed.len(),
            removed_trigrams: before - snap.doc_grams.len(),
            remaining_terms: snap.term_ids.len(),
        };

        *self.snapshot.write() = Arc::new(snap);
        info!(
            target: "framestore::search",
            removed_terms = report.removed_terms,
            removed_trigrams = report.removed_trigrams,
            "Index compacted"
        );
        report
    }

    /// Counters for the current snapshot.
    pub fn stats(&self) -> IndexStats {
        let snap = self.snapshot();
        IndexStats {
            documents: snap.docs.len(),
            terms: snap.term_ids.len(),
            trigrams: snap.doc_grams.len(),
            postings: snap.postings.iter().map(Vec::len).sum(),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }

    /// Whether no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().docs.is_empty()
    }

    /// Whether `id` was part of the last build.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.snapshot.read().doc_of.contains_key(id)
    }

    /// Drop everything.
    pub fn clear(&self) {
        let _guard = self.writer.lock();
        *self.snapshot.write() = Arc::new(IndexSnapshot::default());
    }
}

impl Default for TextIndexer {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl std::fmt::Debug for TextIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextIndexer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// Phrase matching
// ============================================================================

/// Case-insensitive search for the whole query in a record's searchable
/// text (title, newline, body).
///
/// Built once per query. Matching streams the record's characters through
/// `char::to_lowercase` and a KMP automaton, so no per-record string is
/// allocated.
struct PhraseMatcher {
    chars: Vec<char>,
    /// `fail[i]`: length of the longest proper border of `chars[..=i]`
    fail: Vec<usize>,
}

impl PhraseMatcher {
    /// `None` for an empty phrase.
    fn new(phrase: &str) -> Option<Self> {
        let chars: Vec<char> = phrase.chars().flat_map(char::to_lowercase).collect();
        if chars.is_empty() {
            return None;
        }
        let mut fail = vec![0; chars.len()];
        let mut k = 0;
        for i in 1..chars.len() {
            while k > 0 && chars[i] != chars[k] {
                k = fail[k - 1];
            }
            if chars[i] == chars[k] {
                k += 1;
            }
            fail[i] = k;
        }
        Some(PhraseMatcher { chars, fail })
    }

    fn matches(&self, record: &Record) -> bool {
        let text = record
            .title
            .chars()
            .chain(std::iter::once('\n'))
            .chain(record.body.chars())
            .flat_map(char::to_lowercase);
        let mut k = 0;
        for c in text {
            while k > 0 && c != self.chars[k] {
                k = self.fail[k - 1];
            }
            if c == self.chars[k] {
                k += 1;
                if k == self.chars.len() {
                    return true;
                }
            }
        }
        false
    }
}
