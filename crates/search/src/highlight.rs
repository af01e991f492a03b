//! Highlight ranges over a record's preview text
//!
//! Offsets are in characters, end-exclusive. Matching lowercases each
//! character to its first lowercase mapping so offsets stay aligned with
//! the original text.

use framestore_core::{HighlightRange, Record};

/// Title, a newline, then the first `preview_chars` characters of the body.
pub fn preview_text(record: &Record, preview_chars: usize) -> String {
    let mut preview = String::with_capacity(record.title.len() + 1 + preview_chars);
    preview.push_str(&record.title);
    preview.push('\n');
    preview.extend(record.body.chars().take(preview_chars));
    preview
}

#[inline]
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Every case-insensitive occurrence of each term in `text`, merged.
pub fn highlight_ranges<S: AsRef<str>>(text: &str, terms: &[S]) -> Vec<HighlightRange> {
    let haystack: Vec<char> = text.chars().map(fold).collect();
    let mut ranges = Vec::new();
    for term in terms {
        let needle: Vec<char> = term.as_ref().chars().map(fold).collect();
        if needle.is_empty() || needle.len() > haystack.len() {
            continue;
        }
        for start in 0..=haystack.len() - needle.len() {
            if haystack[start..start + needle.len()] == needle[..] {
                ranges.push((start, start + needle.len()));
            }
        }
    }
    merge_ranges(ranges)
}

/// Sort and merge overlapping or adjacent ranges.
pub fn merge_ranges(mut ranges: Vec<HighlightRange>) -> Vec<HighlightRange> {
    ranges.sort_unstable();
    let mut merged: Vec<HighlightRange> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}
