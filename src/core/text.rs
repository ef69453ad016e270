//! Tokenization and term-overlap measures.
//!
//! Salient terms are lowercase words that are not stopwords and are at
//! least [`MIN_TERM_LEN`] characters long. Runs of Han ideographs have no
//! word boundaries, so they contribute overlapping character bigrams
//! instead.

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

use super::query::is_han;

/// Minimum length (in chars) of a non-Han salient term.
pub const MIN_TERM_LEN: usize = 3;

/// English and Chinese function words ignored by term extraction.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "done", "each", "few", "for", "from",
    "further", "get", "got", "had", "has", "have", "having", "he", "her", "here", "him", "his",
    "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "most", "my",
    "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "out",
    "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "us", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "tell",
    "explain", "describe", "please", "give", "know", "way", "ways", "thing", "things",
    "的", "是", "什么", "如何", "怎么", "吗", "了", "在", "和", "与", "及", "呢", "吧", "请",
];

/// Returns `true` if `word` (already lowercase) is a stopword.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Splits `text` into lowercase words following Unicode word boundaries.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Extracts the set of salient terms from `text`.
#[must_use]
pub fn salient_terms(text: &str) -> BTreeSet<String> {
    let mut terms: BTreeSet<String> = text
        .unicode_words()
        .filter(|w| !w.chars().any(is_han))
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= MIN_TERM_LEN && !is_stopword(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect();

    let mut run: Vec<char> = Vec::new();
    for c in text.chars().chain(std::iter::once(' ')) {
        if is_han(c) {
            run.push(c);
            continue;
        }
        match run.len() {
            0 => {}
            1 => {
                terms.insert(run[0].to_string());
            }
            _ => {
                for pair in run.windows(2) {
                    terms.insert(pair.iter().collect());
                }
            }
        }
        run.clear();
    }

    terms
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`; `0.0` when both sets are empty.
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Fraction of `reference` terms present in `candidate`; `0.0` when
/// `reference` is empty.
#[must_use]
pub fn coverage(reference: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    reference.intersection(candidate).count() as f64 / reference.len() as f64
}
