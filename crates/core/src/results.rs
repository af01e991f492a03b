//! Values the engine hands back to the UI layer

use crate::types::RecordId;
use serde::{Deserialize, Serialize};

/// Character-offset range `[start, end)` inside a preview text.
pub type HighlightRange = (usize, usize);

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matching record
    pub record_id: RecordId,
    /// Relevance score (always > 0)
    pub score: f32,
    /// Merged, ordered highlight ranges in the record's preview text
    pub highlights: Vec<HighlightRange>,
}

/// Readability sub-record of [`TextStatistics`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complexity {
    /// unique words / words (0 if no words)
    pub lexical_diversity: f64,
    /// words / sentences (0 if no sentences)
    pub average_sentence_length: f64,
    /// dictionary technical terms / words (0 if no words)
    pub technical_term_ratio: f64,
}

/// Deterministic statistics of a text
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextStatistics {
    /// Whitespace-separated words
    pub word_count: usize,
    /// Lines (newlines + 1 for non-empty text)
    pub line_count: usize,
    /// Unicode scalar values
    pub character_count: usize,
    /// Sentence terminator runs
    pub sentence_count: usize,
    /// Mean characters per word
    pub average_word_length: f64,
    /// Seconds at 250 words per minute
    pub reading_time_seconds: f64,
    /// Readability metrics
    pub complexity: Complexity,
}

/// Display-ready output for a source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedOutput {
    /// Formatted content
    pub content: String,
    /// True for a fast truncated stand-in; a full render follows
    pub is_placeholder: bool,
    /// Wall time spent producing `content`
    pub render_time_seconds: f64,
}

impl RenderedOutput {
    /// A completed render
    pub fn complete(content: String, render_time_seconds: f64) -> Self {
        RenderedOutput {
            content,
            is_placeholder: false,
            render_time_seconds,
        }
    }

    /// A provisional stand-in
    pub fn placeholder(content: String) -> Self {
        RenderedOutput {
            content,
            is_placeholder: true,
            render_time_seconds: 0.0,
        }
    }
}
