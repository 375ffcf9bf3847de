//! Chunk storage: similarity and keyword lookup over indexed fragments.
//!
//! Two implementations share one contract:
//! - [`MemoryChunkStore`]: copy-then-swap snapshots, for tests and
//!   short-lived processes.
//! - [`SqliteChunkStore`]: durable index under `.citewise/index.sqlite`.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryChunkStore;
pub use sqlite::SqliteChunkStore;

use crate::types::{Chunk, ChunkFilter, DocumentSummary};
use citewise_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Storage of chunks with their embeddings and metadata.
///
/// Readers never observe a partially applied batch.
pub trait ChunkStore: Send + Sync {
    /// Dimensionality every stored embedding must have.
    fn dimensions(&self) -> usize;

    /// Insert or replace chunks by id. Returns the number of distinct ids
    /// written.
    ///
    /// The whole batch is rejected with `DimensionMismatch` if any embedding
    /// has the wrong length.
    fn upsert(&self, chunks: Vec<Chunk>) -> AppResult<usize>;

    /// Remove every chunk of `source_document` in one step. Returns the
    /// number removed; an unknown document removes nothing.
    fn delete_document(&self, source_document: &str) -> AppResult<usize>;

    /// Top `k` chunks by cosine similarity to `vector`.
    fn query_semantic(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> AppResult<Vec<(Chunk, f32)>>;

    /// Top `k` chunks by term overlap with `terms`; only positive scores.
    fn query_keyword(
        &self,
        terms: &[String],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> AppResult<Vec<(Chunk, f32)>>;

    /// Fetch one chunk. Unknown ids are `NotFound`.
    fn get(&self, id: &str) -> AppResult<Chunk>;

    /// All chunks matching `filter`, in document order
    /// (source document, then sequence index).
    fn chunks(&self, filter: Option<&ChunkFilter>) -> AppResult<Vec<Chunk>>;

    /// Per-document chunk counts, ordered by document.
    fn documents(&self) -> AppResult<Vec<DocumentSummary>>;

    fn len(&self) -> AppResult<usize>;

    fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Reject the batch if any embedding has the wrong length.
pub(crate) fn validate_batch(chunks: &[Chunk], dimensions: usize) -> AppResult<()> {
    for chunk in chunks {
        if chunk.embedding.len() != dimensions {
            tracing::warn!(
                chunk_id = %chunk.id,
                expected = dimensions,
                actual = chunk.embedding.len(),
                "Rejecting batch with mismatched embedding"
            );
            return Err(AppError::DimensionMismatch {
                chunk_id: chunk.id.clone(),
                expected: dimensions,
                actual: chunk.embedding.len(),
            });
        }
        if chunk.id.trim().is_empty() {
            return Err(AppError::Knowledge(format!(
                "Chunk {} of {} has an empty id",
                chunk.sequence_index, chunk.source_document
            )));
        }
    }
    Ok(())
}

/// Ids in the batch, counting a repeated id once.
pub(crate) fn distinct_ids(chunks: &[Chunk]) -> usize {
    chunks.iter().map(|c| c.id.as_str()).collect::<HashSet<_>>().len()
}

pub(crate) fn validate_query(vector: &[f32], dimensions: usize) -> AppResult<()> {
    if vector.len() != dimensions {
        return Err(AppError::DimensionMismatch {
            chunk_id: "<query>".to_string(),
            expected: dimensions,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Calculate cosine similarity between two vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort by score descending, ties by chunk id, and keep the first `k`.
pub(crate) fn top_k(mut results: Vec<(Chunk, f32)>, k: usize) -> Vec<(Chunk, f32)> {
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    results.truncate(k);
    results
}

pub(crate) fn document_order(a: &Chunk, b: &Chunk) -> Ordering {
    a.source_document
        .cmp(&b.source_document)
        .then(a.sequence_index.cmp(&b.sequence_index))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: String::new(),
            embedding,
            source_document: "doc".to_string(),
            category: "fees".to_string(),
            page_or_section: None,
            sequence_index: 0,
            ocr_confidence: None,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_top_k_breaks_ties_by_id() {
        let results = vec![
            (chunk("b", vec![]), 0.5),
            (chunk("a", vec![]), 0.5),
            (chunk("c", vec![]), 0.9),
        ];
        let ranked = top_k(results, 2);
        assert_eq!(ranked[0].0.id, "c");
        assert_eq!(ranked[1].0.id, "a");
    }

    #[test]
    fn test_validate_batch_reports_offending_chunk() {
        let batch = vec![chunk("ok", vec![0.0; 3]), chunk("bad", vec![0.0; 2])];
        match validate_batch(&batch, 3) {
            Err(AppError::DimensionMismatch {
                chunk_id,
                expected,
                actual,
            }) => {
                assert_eq!(chunk_id, "bad");
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
