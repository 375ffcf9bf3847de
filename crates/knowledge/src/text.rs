//! Text normalization shared by keyword search, re-ranking and grounding.
//!
//! Tokens are lowercase Unicode words with apostrophes and inner dots
//! removed (`B.Tech` and `btech` are the same token). Tokens shorter than
//! two characters are dropped.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "an", "as", "are", "was", "were", "for", "to", "of", "in",
    "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had", "it",
    "its", "their", "they", "them", "what", "whats", "when", "where", "who", "whom", "how", "why",
    "do", "does", "did", "can", "could", "should", "would", "will", "shall", "may", "me", "my",
    "we", "our", "you", "your", "about", "please", "tell", "there", "any", "if", "so", "than",
    "then", "into", "also", "not", "no", "am", "been", "being", "these", "those", "here", "some",
    "all", "such", "i", "a",
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

static MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").ok());

/// Whether a normalized token is a stop word.
pub fn is_stop_word(token: &str) -> bool {
    STOP_SET.contains(token)
}

/// Normalize a single term the way [`tokenize`] normalizes words.
pub fn normalize_term(term: &str) -> String {
    term.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '\'' | '\u{2019}'))
        .collect()
}

/// All tokens of `text`, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(normalize_term)
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

/// Tokens of `text` that carry meaning (stop words removed), in order.
pub fn content_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Content terms with duplicates removed, first occurrence kept.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content_terms(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Term frequencies of every token in `text`.
pub fn term_counts(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Keyword relevance of a document for a set of query terms.
///
/// Each matched term contributes `1 + ln(tf)`; the sum is divided by the
/// number of distinct query terms.
pub fn keyword_score(counts: &HashMap<String, u32>, terms: &[String]) -> f32 {
    let unique: HashSet<String> = terms.iter().map(|t| normalize_term(t)).collect();
    if unique.is_empty() {
        return 0.0;
    }

    let total: f32 = unique
        .iter()
        .filter_map(|t| counts.get(t))
        .map(|&tf| 1.0 + (tf as f32).ln())
        .sum();

    total / unique.len() as f32
}

/// Adjacent pairs of `terms`, joined by a space.
pub fn bigrams(terms: &[String]) -> Vec<String> {
    terms
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect()
}

/// Unigrams and bigrams of `terms` as a set.
pub fn ngram_set(terms: &[String]) -> HashSet<String> {
    let mut grams: HashSet<String> = terms.iter().cloned().collect();
    grams.extend(bigrams(terms));
    grams
}

/// Split text into sentences (Unicode sentence boundaries, paragraphs
/// always break).
pub fn sentences(text: &str) -> Vec<&str> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Citation markers (`[n]`) appearing in `text`, in order.
pub fn citation_markers(text: &str) -> Vec<usize> {
    let Some(re) = MARKER.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// `text` with citation markers removed.
pub fn strip_markers(text: &str) -> String {
    match MARKER.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Rough token count used for context budgets: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Whether any token of `counts` starts with `term` (exact match for
/// short terms), so `holiday` finds `holidays`.
pub fn mentions(counts: &HashMap<String, u32>, term: &str) -> bool {
    let term = normalize_term(term);
    if term.chars().count() < 4 {
        return counts.contains_key(&term);
    }
    counts.keys().any(|token| token.starts_with(&term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_normalizes_dotted_abbreviations() {
        assert_eq!(tokenize("B.Tech fees"), vec!["btech", "fees"]);
        assert_eq!(tokenize("What's 2+2?"), vec!["whats"]);
    }

    #[test]
    fn test_content_terms_drop_stop_words() {
        assert_eq!(
            content_terms("What's the last day to drop a course?"),
            vec!["last", "day", "drop", "course"]
        );
        assert!(content_terms("What is 2+2").is_empty());
    }

    #[test]
    fn test_keyword_score() {
        let counts = term_counts("Hostel fee. Hostel rules. Hostel curfew.");
        let terms = vec!["hostel".to_string(), "library".to_string()];
        let score = keyword_score(&counts, &terms);
        assert!((score - (1.0 + 3f32.ln()) / 2.0).abs() < 1e-6);

        let dup = vec!["hostel".to_string(), "Hostel".to_string()];
        assert!((keyword_score(&counts, &dup) - (1.0 + 3f32.ln())).abs() < 1e-6);
        assert_eq!(keyword_score(&counts, &[]), 0.0);
    }

    #[test]
    fn test_sentences_keep_abbreviations_together() {
        let parts = sentences("The B.Tech fee is Rs. 500 per semester. Pay online.\n\nLate fines apply.");
        assert_eq!(parts.len(), 3);
        assert!(parts[0].contains("B.Tech"));
    }

    #[test]
    fn test_citation_markers() {
        assert_eq!(citation_markers("July 15 [1]. See also [3][12]."), vec![1, 3, 12]);
        assert_eq!(strip_markers("July 15 [1]."), "July 15 .");
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcd"), 1);
    }

    #[test]
    fn test_mentions_matches_plural() {
        let counts = term_counts("Holidays: Diwali break");
        assert!(mentions(&counts, "holiday"));
        assert!(!mentions(&counts, "exam"));
        assert!(mentions(&term_counts("Add/drop period"), "drop"));
    }
}
