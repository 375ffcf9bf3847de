//! SQLite-backed chunk store.
//!
//! Embeddings are stored as little-endian `f32` blobs and term frequencies
//! as JSON, so keyword queries do not re-tokenize chunk text. Each upsert
//! batch is a single transaction.

use super::{distinct_ids, document_order, top_k, validate_batch, validate_query, ChunkStore};
use crate::store::cosine_similarity;
use crate::text::{keyword_score, term_counts};
use crate::types::{Chunk, ChunkFilter, DocumentSummary};
use chrono::{DateTime, Utc};
use citewise_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SELECT_COLUMNS: &str = "id, text, embedding, source_document, category, page_or_section, \
     sequence_index, ocr_confidence, terms";

/// Durable chunk store.
pub struct SqliteChunkStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl SqliteChunkStore {
    /// Open (creating if needed) the index at `db_path`.
    ///
    /// An index created with a different embedding dimensionality is refused.
    pub fn open(db_path: &Path, dimensions: usize) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;
        let store = Self::with_connection(conn, dimensions)?;
        tracing::debug!("Opened SQLite chunk store at {:?}", db_path);
        Ok(store)
    }

    /// Store backed by a private in-memory database.
    pub fn in_memory(dimensions: usize) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;
        Self::with_connection(conn, dimensions)
    }

    fn with_connection(conn: Connection, dimensions: usize) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                source_document TEXT NOT NULL,
                category TEXT NOT NULL,
                page_or_section TEXT,
                sequence_index INTEGER NOT NULL,
                ocr_confidence REAL,
                terms TEXT NOT NULL,
                indexed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_document);
            CREATE INDEX IF NOT EXISTS idx_chunks_category ON chunks(category);
            "#,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Knowledge(format!("Failed to read index metadata: {}", e)))?;

        match stored {
            Some(value) => {
                let existing: usize = value.parse().map_err(|_| {
                    AppError::Knowledge(format!("Corrupt dimensions entry in index: {}", value))
                })?;
                if existing != dimensions {
                    return Err(AppError::Config(format!(
                        "Index was built with {}-dimensional embeddings but the engine is configured for {}",
                        existing, dimensions
                    )));
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?1)",
                    params![dimensions.to_string()],
                )
                .map_err(|e| AppError::Knowledge(format!("Failed to write index metadata: {}", e)))?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Knowledge("SQLite connection lock poisoned".to_string()))
    }

    /// Load rows matching `filter` with their term counts.
    fn load(&self, filter: Option<&ChunkFilter>) -> AppResult<Vec<(Chunk, HashMap<String, u32>)>> {
        let conn = self.conn()?;
        let category = filter.and_then(|f| f.category.clone());
        let source = filter.and_then(|f| f.source_document.clone());

        let sql = format!(
            "SELECT {} FROM chunks \
             WHERE (?1 IS NULL OR lower(category) = lower(?1)) \
               AND (?2 IS NULL OR lower(source_document) = lower(?2))",
            SELECT_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![category, source], row_to_entry)
            .map_err(|e| AppError::Knowledge(format!("Failed to query chunks: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Knowledge(format!("Failed to read chunk row: {}", e)))
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<(Chunk, HashMap<String, u32>)> {
    let embedding_bytes: Vec<u8> = row.get(2)?;
    let embedding = bytes_to_embedding(&embedding_bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Blob, Box::new(e)))?;

    let terms_json: String = row.get(8)?;
    let terms: HashMap<String, u32> = serde_json::from_str(&terms_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e)))?;

    let chunk = Chunk {
        id: row.get(0)?,
        text: row.get(1)?,
        embedding,
        source_document: row.get(3)?,
        category: row.get(4)?,
        page_or_section: row.get(5)?,
        sequence_index: row.get::<_, i64>(6)? as u32,
        ocr_confidence: row.get::<_, Option<f64>>(7)?.map(|v| v as f32),
    };
    Ok((chunk, terms))
}

impl ChunkStore for SqliteChunkStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn upsert(&self, chunks: Vec<Chunk>) -> AppResult<usize> {
        validate_batch(&chunks, self.dimensions)?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;
        let now = Utc::now().to_rfc3339();

        for chunk in &chunks {
            let terms = serde_json::to_string(&term_counts(&chunk.text))?;
            tx.execute(
                "INSERT OR REPLACE INTO chunks \
                 (id, text, embedding, source_document, category, page_or_section, \
                  sequence_index, ocr_confidence, terms, indexed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    chunk.id,
                    chunk.text,
                    embedding_to_bytes(&chunk.embedding),
                    chunk.source_document,
                    chunk.category,
                    chunk.page_or_section,
                    chunk.sequence_index as i64,
                    chunk.ocr_confidence.map(|v| v as f64),
                    terms,
                    now,
                ],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk {}: {}", chunk.id, e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit chunks: {}", e)))?;

        let count = distinct_ids(&chunks);
        tracing::debug!(count, "Upserted chunks into SQLite store");
        Ok(count)
    }

    fn delete_document(&self, source_document: &str) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;

        let removed = tx
            .execute(
                "DELETE FROM chunks WHERE source_document = ?1",
                params![source_document],
            )
            .map_err(|e| {
                AppError::Knowledge(format!("Failed to delete {}: {}", source_document, e))
            })?;

        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit delete: {}", e)))?;

        tracing::debug!(source_document, removed, "Deleted document from SQLite store");
        Ok(removed)
    }

    fn query_semantic(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> AppResult<Vec<(Chunk, f32)>> {
        validate_query(vector, self.dimensions)?;

        let results = self
            .load(filter)?
            .into_iter()
            .map(|(chunk, _)| {
                let score = cosine_similarity(vector, &chunk.embedding);
                (chunk, score)
            })
            .collect();

        let results = top_k(results, k);
        tracing::debug!("Retrieved {} chunks (requested top-{})", results.len(), k);
        Ok(results)
    }

    fn query_keyword(
        &self,
        terms: &[String],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> AppResult<Vec<(Chunk, f32)>> {
        let results = self
            .load(filter)?
            .into_iter()
            .map(|(chunk, counts)| {
                let score = keyword_score(&counts, terms);
                (chunk, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        Ok(top_k(results, k))
    }

    fn get(&self, id: &str) -> AppResult<Chunk> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM chunks WHERE id = ?1", SELECT_COLUMNS);
        conn.query_row(&sql, params![id], row_to_entry)
            .optional()
            .map_err(|e| AppError::Knowledge(format!("Failed to fetch chunk {}: {}", id, e)))?
            .map(|(chunk, _)| chunk)
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    fn chunks(&self, filter: Option<&ChunkFilter>) -> AppResult<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self.load(filter)?.into_iter().map(|(c, _)| c).collect();
        chunks.sort_by(document_order);
        Ok(chunks)
    }

    fn documents(&self) -> AppResult<Vec<DocumentSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT source_document, min(category), COUNT(*), max(indexed_at) \
                 FROM chunks GROUP BY source_document ORDER BY source_document",
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let indexed_at: Option<String> = row.get(3)?;
                Ok(DocumentSummary {
                    source_document: row.get(0)?,
                    category: row.get(1)?,
                    chunk_count: row.get::<_, i64>(2)? as usize,
                    last_indexed: indexed_at
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|d| d.with_timezone(&Utc)),
                })
            })
            .map_err(|e| AppError::Knowledge(format!("Failed to list documents: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Knowledge(format!("Failed to read document row: {}", e)))
    }

    fn len(&self) -> AppResult<usize> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| {
            row.get::<_, i64>(0).map(|v| v as usize)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count chunks: {}", e)))
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, source: &str, seq: u32, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
            source_document: source.to_string(),
            category: "policies".to_string(),
            page_or_section: Some(format!("Page {}", seq + 1)),
            sequence_index: seq,
            ocr_confidence: Some(0.92),
        }
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteChunkStore::in_memory(3).unwrap();
        store
            .upsert(vec![
                chunk("c1", "library.pdf", 0, "Library fine is Rs 10 per day", vec![1.0, 0.0, 0.0]),
                chunk("c2", "hostel.pdf", 0, "Hostel curfew is 10 PM", vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let results = store.query_semantic(&[1.0, 0.0, 0.0], 5, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "c1");

        let loaded = store.get("c1").unwrap();
        assert_eq!(loaded.embedding, vec![1.0, 0.0, 0.0]);
        assert_eq!(loaded.page_or_section.as_deref(), Some("Page 1"));
        assert!((loaded.ocr_confidence.unwrap() - 0.92).abs() < 1e-6);

        let keyword = store.query_keyword(&["curfew".to_string()], 5, None).unwrap();
        assert_eq!(keyword.len(), 1);
        assert_eq!(keyword[0].0.id, "c2");
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".citewise/index.sqlite");
        {
            let store = SqliteChunkStore::open(&path, 2).unwrap();
            store
                .upsert(vec![chunk("c1", "a.pdf", 0, "alpha", vec![1.0, 0.0])])
                .unwrap();
        }

        let store = SqliteChunkStore::open(&path, 2).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(SqliteChunkStore::open(&path, 3).is_err());
    }

    #[test]
    fn test_upsert_same_id_keeps_one_row() {
        let store = SqliteChunkStore::in_memory(2).unwrap();
        store.upsert(vec![chunk("c1", "a.pdf", 0, "old", vec![1.0, 0.0])]).unwrap();
        store.upsert(vec![chunk("c1", "a.pdf", 0, "new", vec![1.0, 0.0])]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("c1").unwrap().text, "new");
    }

    #[test]
    fn test_upsert_counts_repeated_ids_once() {
        let store = SqliteChunkStore::in_memory(2).unwrap();
        let written = store
            .upsert(vec![
                chunk("c1", "a.pdf", 0, "old", vec![1.0, 0.0]),
                chunk("c1", "a.pdf", 0, "new", vec![1.0, 0.0]),
                chunk("c2", "a.pdf", 1, "other", vec![0.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get("c1").unwrap().text, "new");
    }

    #[test]
    fn test_delete_document_removes_only_its_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".citewise/index.sqlite");
        {
            let store = SqliteChunkStore::open(&path, 2).unwrap();
            store
                .upsert(vec![
                    chunk("a0", "a.pdf", 0, "alpha", vec![1.0, 0.0]),
                    chunk("a1", "a.pdf", 1, "beta", vec![1.0, 0.0]),
                    chunk("b0", "b.pdf", 0, "gamma", vec![0.0, 1.0]),
                ])
                .unwrap();
            assert_eq!(store.delete_document("a.pdf").unwrap(), 2);
            assert_eq!(store.delete_document("missing.pdf").unwrap(), 0);
        }

        let store = SqliteChunkStore::open(&path, 2).unwrap();
        let ids: Vec<String> = store.chunks(None).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b0"]);
        assert!(matches!(store.get("a0"), Err(AppError::NotFound(_))));
        assert!(store.query_keyword(&["alpha".to_string()], 5, None).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_writes_nothing() {
        let store = SqliteChunkStore::in_memory(2).unwrap();
        let result = store.upsert(vec![
            chunk("c1", "a.pdf", 0, "ok", vec![1.0, 0.0]),
            chunk("c2", "a.pdf", 1, "bad", vec![1.0, 0.0, 0.0]),
        ]);
        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = SqliteChunkStore::in_memory(2).unwrap();
        assert!(matches!(store.get("missing"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_chunks_in_document_order_and_documents() {
        let store = SqliteChunkStore::in_memory(2).unwrap();
        store
            .upsert(vec![
                chunk("b1", "b.pdf", 1, "second", vec![1.0, 0.0]),
                chunk("b0", "b.pdf", 0, "first", vec![1.0, 0.0]),
                chunk("a0", "a.pdf", 0, "alpha", vec![0.0, 1.0]),
            ])
            .unwrap();

        let ids: Vec<String> = store.chunks(None).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a0", "b0", "b1"]);

        let docs = store.documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].source_document, "b.pdf");
        assert_eq!(docs[1].chunk_count, 2);
        assert!(docs[1].last_indexed.is_some());

        let filtered = store
            .chunks(Some(&ChunkFilter::source_document("A.PDF")))
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
