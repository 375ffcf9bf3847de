//! Second-pass relevance scoring of retrieval candidates.

use crate::text::{bigrams, content_terms, ngram_set, query_terms};

const UNIGRAM_WEIGHT: f32 = 0.7;
const BIGRAM_WEIGHT: f32 = 0.3;

/// Scores how well a text answers a question, in `[0, 1]`.
///
/// Runs over a handful of candidates only, so implementations may be far
/// more expensive than first-stage retrieval (e.g. a cross-encoder model).
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, question: &str, text: &str) -> f32;
}

/// Term-coverage reranker.
///
/// Score is `0.7 * unigram coverage + 0.3 * bigram coverage` of the
/// question's content terms in the text. Questions with a single content
/// term are scored on unigram coverage alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }
}

impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score(&self, question: &str, text: &str) -> f32 {
        let terms = query_terms(question);
        if terms.is_empty() {
            return 0.0;
        }

        let grams = ngram_set(&content_terms(text));
        let coverage = |items: &[String]| {
            let hits = items.iter().filter(|t| grams.contains(*t)).count();
            hits as f32 / items.len() as f32
        };

        let unigram = coverage(&terms);
        let pairs = bigrams(&terms);
        if pairs.is_empty() {
            return unigram;
        }

        UNIGRAM_WEIGHT * unigram + BIGRAM_WEIGHT * coverage(&pairs)
    }
}
