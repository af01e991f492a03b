//! Character trigrams for fuzzy term matching

use smallvec::SmallVec;

/// Three consecutive characters of a normalized token.
pub type Trigram = [char; 3];

/// Padding used for tokens shorter than three characters.
const PAD: char = '\u{0}';

/// Grams of one token, deduplicated, in first-occurrence order.
pub type Grams = SmallVec<[Trigram; 16]>;

/// Every 3-character window of `token`.
///
/// Tokens of one or two characters yield a single padded gram so they can
/// still take part in similarity checks.
pub fn trigrams(token: &str) -> Grams {
    let chars: SmallVec<[char; 32]> = token.chars().collect();
    let mut grams = Grams::new();
    match chars.len() {
        0 => {}
        1 => grams.push([chars[0], PAD, PAD]),
        2 => grams.push([chars[0], chars[1], PAD]),
        _ => {
            for w in chars.windows(3) {
                let gram = [w[0], w[1], w[2]];
                if !grams.contains(&gram) {
                    grams.push(gram);
                }
            }
        }
    }
    grams
}

/// Jaccard similarity of two gram sets given their sizes and overlap.
#[inline]
pub fn jaccard(shared: usize, a: usize, b: usize) -> f64 {
    let union = a + b - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Jaccard similarity of two tokens' trigram sets.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ga = trigrams(a);
    let gb = trigrams(b);
    let shared = ga.iter().filter(|g| gb.contains(g)).count();
    jaccard(shared, ga.len(), gb.len())
}
