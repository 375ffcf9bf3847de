//! Lexical citation extraction and grounding verification.
//!
//! A sentence is attributed to a source when at least
//! `citation_overlap_threshold` of the sentence's content unigrams and
//! bigrams also occur in the source. The grounding score is the share of
//! answer content terms that sit in attributed sentences.

use crate::config::GroundingConfig;
use crate::text::{citation_markers, content_terms, ngram_set, sentences, strip_markers};
use std::collections::{BTreeSet, HashSet};

/// Outcome of checking one answer against its sources.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingReport {
    /// 1-based ranks of the sources the answer uses, ascending
    pub cited: Vec<usize>,

    /// Share of answer content terms attributable to some source
    pub score: f32,

    pub is_grounded: bool,
}

#[derive(Debug, Clone)]
pub struct GroundingChecker {
    config: GroundingConfig,
}

impl GroundingChecker {
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }

    pub fn disclaimer(&self) -> &str {
        &self.config.disclaimer
    }

    /// Check `answer` against `sources`, where `sources[i]` is the text of
    /// context block `[i + 1]`.
    pub fn check(&self, answer: &str, sources: &[&str]) -> GroundingReport {
        let source_grams: Vec<HashSet<String>> = sources
            .iter()
            .map(|text| ngram_set(&content_terms(text)))
            .collect();

        let mut cited: BTreeSet<usize> = citation_markers(answer)
            .into_iter()
            .filter(|rank| (1..=sources.len()).contains(rank))
            .collect();

        let threshold = self.config.citation_overlap_threshold;
        let mut total = 0usize;
        let mut attributable = 0usize;

        for sentence in sentences(answer) {
            let terms = content_terms(&strip_markers(sentence));
            if terms.is_empty() {
                continue;
            }
            let grams = ngram_set(&terms);
            total += terms.len();

            let mut supported = false;
            for (i, source) in source_grams.iter().enumerate() {
                let shared = grams.iter().filter(|g| source.contains(*g)).count();
                if shared as f32 / grams.len() as f32 >= threshold {
                    cited.insert(i + 1);
                    supported = true;
                }
            }
            if supported {
                attributable += terms.len();
            }
        }

        let score = if total == 0 {
            0.0
        } else {
            attributable as f32 / total as f32
        };

        GroundingReport {
            cited: cited.into_iter().collect(),
            score,
            is_grounded: total > 0 && score >= self.config.grounding_threshold,
        }
    }
}
