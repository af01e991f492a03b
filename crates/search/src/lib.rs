//! Text search and statistics for Framestore
//!
//! This crate provides:
//! - TextIndexer: inverted index plus trigram index with fuzzy expansion,
//!   built in parallel batches and swapped in atomically
//! - Tokenizer shared by indexing and queries
//! - Highlight ranges over record previews
//! - StatsComputer: chunked byte-classification statistics with an LRU cache

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod highlight;
pub mod index;
pub mod stats;
pub mod tokenizer;
pub mod trigram;

pub use highlight::{highlight_ranges, merge_ranges, preview_text};
pub use index::{CompactionReport, IndexConfig, IndexSnapshot, IndexStats, Posting, TextIndexer};
pub use stats::{analyze, StatsCacheStats, StatsComputer, StatsConfig};
pub use tokenizer::{tokenize, tokenize_unique};
