//! Text tokenizer for indexing and queries
//!
//! Pipeline: UAX#29 word boundaries → remove non-alphanumeric → lowercase
//!
//! No stemming and no stopwords: fuzzy matching works on the surface form,
//! and short queries like "go" or "c" must still hit.

use rustc_hash::FxHashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Normalize one word. Returns `None` if nothing alphanumeric remains.
#[inline]
fn normalize(word: &str) -> Option<String> {
    let token: String = word
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Tokenize text into index terms, in document order.
///
/// # Example
///
/// ```
/// use framestore_search::tokenizer::tokenize;
///
/// let tokens = tokenize("Don't PANIC: it's fine!");
/// assert_eq!(tokens, vec!["dont", "panic", "its", "fine"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().filter_map(normalize).collect()
}

/// Tokenize and deduplicate for query processing, keeping first occurrence order.
///
/// # Example
///
/// ```
/// use framestore_search::tokenizer::tokenize_unique;
///
/// let tokens = tokenize_unique("Cache cache CACHE miss");
/// assert_eq!(tokens, vec!["cache", "miss"]);
/// ```
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize("Hello, World!");
        assert_eq!(tokens, vec!["hello", "world"]);
    }

    #[test]
    fn test_tokenize_keeps_short_words() {
        let tokens = tokenize("I am a test");
        assert_eq!(tokens, vec!["i", "am", "a", "test"]);
    }

    #[test]
    fn test_tokenize_numbers() {
        let tokens = tokenize("test123 foo456bar");
        assert_eq!(tokens, vec!["test123", "foo456bar"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_only_punctuation() {
        assert!(tokenize("...---...").is_empty());
    }

    #[test]
    fn test_tokenize_unicode() {
        let tokens = tokenize("Café Ünïcödé naïve");
        assert_eq!(tokens, vec!["café", "ünïcödé", "naïve"]);
    }

    #[test]
    fn test_tokenize_unique_preserves_order() {
        let tokens = tokenize_unique("beta alpha beta gamma alpha");
        assert_eq!(tokens, vec!["beta", "alpha", "gamma"]);
    }
}
