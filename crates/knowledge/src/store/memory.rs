//! In-memory chunk store.

use super::{distinct_ids, document_order, top_k, validate_batch, validate_query, ChunkStore};
use crate::store::cosine_similarity;
use crate::text::{keyword_score, term_counts};
use crate::types::{Chunk, ChunkFilter, DocumentSummary};
use chrono::{DateTime, Utc};
use citewise_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    terms: HashMap<String, u32>,
    indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    entries: BTreeMap<String, Entry>,
}

/// Chunk store held entirely in memory.
///
/// Writers build a new snapshot and swap it in; readers hold an `Arc` to the
/// snapshot they started with.
#[derive(Debug)]
pub struct MemoryChunkStore {
    dimensions: usize,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl MemoryChunkStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(()),
        }
    }

    fn current(&self) -> AppResult<Arc<Snapshot>> {
        self.snapshot
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| AppError::Knowledge("Chunk store lock poisoned".to_string()))
    }

    /// Apply `edit` to a copy of the current snapshot and swap it in.
    fn write(&self, edit: impl FnOnce(&mut Snapshot)) -> AppResult<()> {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| AppError::Knowledge("Chunk store writer lock poisoned".to_string()))?;

        let mut next = (*self.current()?).clone();
        edit(&mut next);

        let mut slot = self
            .snapshot
            .write()
            .map_err(|_| AppError::Knowledge("Chunk store lock poisoned".to_string()))?;
        *slot = Arc::new(next);
        Ok(())
    }

    fn filtered<'a>(
        snapshot: &'a Snapshot,
        filter: Option<&'a ChunkFilter>,
    ) -> impl Iterator<Item = &'a Entry> + 'a {
        snapshot
            .entries
            .values()
            .filter(move |e| filter.map_or(true, |f| f.matches(&e.chunk)))
    }
}

impl ChunkStore for MemoryChunkStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn upsert(&self, chunks: Vec<Chunk>) -> AppResult<usize> {
        validate_batch(&chunks, self.dimensions)?;
        let count = distinct_ids(&chunks);

        self.write(|next| {
            let now = Utc::now();
            for chunk in chunks {
                let terms = term_counts(&chunk.text);
                next.entries.insert(
                    chunk.id.clone(),
                    Entry {
                        chunk,
                        terms,
                        indexed_at: now,
                    },
                );
            }
        })?;

        tracing::debug!(count, "Upserted chunks into memory store");
        Ok(count)
    }

    fn delete_document(&self, source_document: &str) -> AppResult<usize> {
        let mut removed = 0;
        self.write(|next| {
            let before = next.entries.len();
            next.entries.retain(|_, e| e.chunk.source_document != source_document);
            removed = before - next.entries.len();
        })?;

        tracing::debug!(source_document, removed, "Deleted document from memory store");
        Ok(removed)
    }

    fn query_semantic(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> AppResult<Vec<(Chunk, f32)>> {
        validate_query(vector, self.dimensions)?;
        let snapshot = self.current()?;

        let results = Self::filtered(&snapshot, filter)
            .map(|e| (e.chunk.clone(), cosine_similarity(vector, &e.chunk.embedding)))
            .collect();

        Ok(top_k(results, k))
    }

    fn query_keyword(
        &self,
        terms: &[String],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> AppResult<Vec<(Chunk, f32)>> {
        let snapshot = self.current()?;

        let results = Self::filtered(&snapshot, filter)
            .map(|e| (e, keyword_score(&e.terms, terms)))
            .filter(|(_, score)| *score > 0.0)
            .map(|(e, score)| (e.chunk.clone(), score))
            .collect();

        Ok(top_k(results, k))
    }

    fn get(&self, id: &str) -> AppResult<Chunk> {
        self.current()?
            .entries
            .get(id)
            .map(|e| e.chunk.clone())
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    fn chunks(&self, filter: Option<&ChunkFilter>) -> AppResult<Vec<Chunk>> {
        let snapshot = self.current()?;
        let mut chunks: Vec<Chunk> = Self::filtered(&snapshot, filter)
            .map(|e| e.chunk.clone())
            .collect();
        chunks.sort_by(document_order);
        Ok(chunks)
    }

    fn documents(&self) -> AppResult<Vec<DocumentSummary>> {
        let snapshot = self.current()?;
        let mut documents: BTreeMap<&str, DocumentSummary> = BTreeMap::new();

        for entry in snapshot.entries.values() {
            let summary = documents
                .entry(entry.chunk.source_document.as_str())
                .or_insert_with(|| DocumentSummary {
                    source_document: entry.chunk.source_document.clone(),
                    category: entry.chunk.category.clone(),
                    chunk_count: 0,
                    last_indexed: None,
                });
            summary.chunk_count += 1;
            summary.last_indexed = summary.last_indexed.max(Some(entry.indexed_at));
        }

        Ok(documents.into_values().collect())
    }

    fn len(&self) -> AppResult<usize> {
        Ok(self.current()?.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str, category: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
            source_document: format!("{}.pdf", category),
            category: category.to_string(),
            page_or_section: None,
            sequence_index: 0,
            ocr_confidence: None,
        }
    }

    fn sample_store() -> MemoryChunkStore {
        let store = MemoryChunkStore::new(3);
        store
            .upsert(vec![
                chunk("fee-1", "B.Tech tuition fee is Rs 50000", "fees", vec![1.0, 0.0, 0.0]),
                chunk("cal-1", "Last day to drop: July 15", "calendar", vec![0.0, 1.0, 0.0]),
                chunk("pol-1", "Library fine is Rs 10 per day", "policies", vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_semantic_query_returns_indexed_vector_first() {
        let store = sample_store();
        let results = store.query_semantic(&[0.0, 1.0, 0.0], 2, None).unwrap();
        assert_eq!(results[0].0.id, "cal-1");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_keyword_query_only_positive_scores() {
        let store = sample_store();
        let results = store
            .query_keyword(&["btech".to_string(), "fee".to_string()], 10, None)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, "fee-1");
    }

    #[test]
    fn test_filter_restricts_results() {
        let store = sample_store();
        let filter = ChunkFilter::category("POLICIES");
        let results = store.query_semantic(&[1.0, 0.0, 0.0], 5, Some(&filter)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, "pol-1");
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let store = sample_store();
        store
            .upsert(vec![chunk("cal-1", "Last day to drop: July 20", "calendar", vec![0.0, 1.0, 0.0])])
            .unwrap();
        assert_eq!(store.len().unwrap(), 3);
        assert!(store.get("cal-1").unwrap().text.contains("July 20"));
    }

    #[test]
    fn test_upsert_counts_repeated_ids_once() {
        let store = MemoryChunkStore::new(3);
        let written = store
            .upsert(vec![
                chunk("fee-1", "Rs 50000", "fees", vec![1.0, 0.0, 0.0]),
                chunk("fee-1", "Rs 55000", "fees", vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("fee-1").unwrap().text, "Rs 55000");
    }

    #[test]
    fn test_delete_document_swaps_in_one_step() {
        let store = sample_store();
        let before = store.current().unwrap();

        assert_eq!(store.delete_document("fees.pdf").unwrap(), 1);
        assert_eq!(store.delete_document("fees.pdf").unwrap(), 0);

        assert_eq!(before.entries.len(), 3);
        assert_eq!(store.len().unwrap(), 2);
        assert!(matches!(store.get("fee-1"), Err(AppError::NotFound(_))));
        assert!(store
            .query_keyword(&["tuition".to_string()], 5, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejects_whole_batch() {
        let store = sample_store();
        let result = store.upsert(vec![
            chunk("new-1", "ok", "fees", vec![1.0, 1.0, 0.0]),
            chunk("new-2", "bad", "fees", vec![1.0]),
        ]);
        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
        assert_eq!(store.len().unwrap(), 3);
        assert!(matches!(store.get("new-1"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_reader_keeps_its_snapshot() {
        let store = sample_store();
        let before = store.current().unwrap();
        store
            .upsert(vec![chunk("fee-2", "Hostel fee", "fees", vec![1.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(before.entries.len(), 3);
        assert_eq!(store.len().unwrap(), 4);
    }

    #[test]
    fn test_documents_summary() {
        let store = sample_store();
        let docs = store.documents().unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].source_document, "calendar.pdf");
        assert_eq!(docs[0].chunk_count, 1);
        assert!(docs[0].last_indexed.is_some());
    }
}
