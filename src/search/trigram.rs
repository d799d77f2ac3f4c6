//! Trigram similarity compatible with PostgreSQL `pg_trgm`
//!
//! Text is lowercased and split into words on every non-alphanumeric
//! character. Each word is padded with two spaces in front and one behind
//! and cut into 3-character grams. Similarity is the number of shared grams
//! divided by the number of distinct grams across both strings.

use std::collections::HashSet;

pub type Trigram = [char; 3];

/// Split text into lowercase alphanumeric words
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Set of trigrams of a string
pub fn trigrams(text: &str) -> HashSet<Trigram> {
    let mut grams = HashSet::new();
    for word in words(text) {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert([window[0], window[1], window[2]]);
        }
    }
    grams
}

/// Similarity of two strings in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);
    similarity_of(&left, &right)
}

/// Similarity of two precomputed trigram sets
pub fn similarity_of(left: &HashSet<Trigram>, right: &HashSet<Trigram>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}
