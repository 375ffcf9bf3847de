//! Hybrid retrieval: semantic and keyword search fused, then re-ranked.

use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingProvider;
use crate::rerank::Reranker;
use crate::store::ChunkStore;
use crate::text::{content_terms, query_terms, tokenize};
use crate::types::{Chunk, ChunkFilter, RetrievalCandidate};
use citewise_core::AppResult;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Finds the chunks most relevant to a question.
pub struct HybridRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
    config: RetrievalConfig,
}

#[derive(Default)]
struct Scores {
    semantic: f32,
    semantic_norm: f32,
    keyword: f32,
    keyword_norm: f32,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn Reranker>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Terms for the keyword pass: the question's content terms plus the
    /// configured expansions of any term the question mentions.
    pub fn keyword_query(&self, question: &str) -> Vec<String> {
        let mut terms = query_terms(question);
        let tokens = tokenize(question);

        for (key, expansion) in &self.config.expansions {
            if !tokens.iter().any(|t| t == key) {
                continue;
            }
            for term in content_terms(expansion) {
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }

        terms
    }

    /// Up to `k` candidates ordered by re-rank score, fused score, then id.
    ///
    /// Candidates below `min_relevance` are dropped; an empty result means
    /// nothing relevant was found.
    #[instrument(skip(self, filter))]
    pub async fn retrieve(
        &self,
        question: &str,
        filter: Option<&ChunkFilter>,
        k: usize,
    ) -> AppResult<Vec<RetrievalCandidate>> {
        let pool = self.config.candidate_pool.max(k);

        let vector = self.embedder.embed(question).await?;
        let semantic = self.store.query_semantic(&vector, pool, filter)?;

        let terms = self.keyword_query(question);
        let keyword = if terms.is_empty() {
            Vec::new()
        } else {
            self.store.query_keyword(&terms, pool, filter)?
        };

        debug!(
            semantic = semantic.len(),
            keyword = keyword.len(),
            terms = ?terms,
            "First-stage retrieval"
        );

        let mut merged: HashMap<String, (Chunk, Scores)> = HashMap::new();

        let semantic_norm = min_max(&semantic);
        for ((chunk, score), norm) in semantic.into_iter().zip(semantic_norm) {
            let entry = merged
                .entry(chunk.id.clone())
                .or_insert_with(|| (chunk, Scores::default()));
            entry.1.semantic = score;
            entry.1.semantic_norm = norm;
        }

        let keyword_norm = min_max(&keyword);
        for ((chunk, score), norm) in keyword.into_iter().zip(keyword_norm) {
            let entry = merged
                .entry(chunk.id.clone())
                .or_insert_with(|| (chunk, Scores::default()));
            entry.1.keyword = score;
            entry.1.keyword_norm = norm;
        }

        let alpha = self.config.alpha;
        let mut candidates: Vec<RetrievalCandidate> = merged
            .into_values()
            .map(|(chunk, s)| {
                let rerank = self.reranker.score(question, &chunk.text);
                RetrievalCandidate {
                    fused_score: alpha * s.semantic_norm + (1.0 - alpha) * s.keyword_norm,
                    semantic_score: s.semantic,
                    keyword_score: s.keyword,
                    rerank_score: Some(rerank),
                    chunk,
                }
            })
            .collect();

        candidates.sort_by(rank_order);

        let before = candidates.len();
        candidates.retain(|c| c.rerank_score.unwrap_or(0.0) >= self.config.min_relevance);
        candidates.truncate(k);

        debug!(
            reranker = self.reranker.name(),
            fused = before,
            kept = candidates.len(),
            "Re-ranked candidates"
        );

        Ok(candidates)
    }
}

/// Min-max normalize a result set. A set whose scores are all equal maps to
/// 1.0, or 0.0 when those scores are not positive.
fn min_max(results: &[(Chunk, f32)]) -> Vec<f32> {
    let (min, max) = results
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, s)| {
            (lo.min(*s), hi.max(*s))
        });

    let range = max - min;
    results
        .iter()
        .map(|(_, s)| {
            if range <= f32::EPSILON {
                if max > 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (s - min) / range
            }
        })
        .collect()
}

fn rank_order(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
    let rerank = |c: &RetrievalCandidate| c.rerank_score.unwrap_or(0.0);
    rerank(b)
        .partial_cmp(&rerank(a))
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(Ordering::Equal))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
