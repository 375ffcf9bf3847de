//! Indexing through the engine.

use super::{corpus, fixture_with, indexed, record, DIMS};
use crate::config::EngineConfig;
use crate::embeddings::MockProvider;
use crate::engine::{EngineComponents, QaEngine};
use crate::rerank::LexicalReranker;
use crate::store::{ChunkStore, MemoryChunkStore};
use crate::types::{Chunk, ChunkRecord};
use citewise_core::AppError;
use citewise_llm::MockClient;
use citewise_prompt::PromptSet;
use proptest::prelude::*;
use std::sync::Arc;

fn chunk(id: &str, text: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        embedding,
        source_document: "notice.pdf".to_string(),
        category: "general".to_string(),
        page_or_section: Some("Page 1".to_string()),
        sequence_index: 0,
        ocr_confidence: None,
    }
}

#[tokio::test]
async fn test_records_get_ids_and_embeddings() {
    let fixture = indexed(MockClient::quoting(), EngineConfig::default()).await;

    assert_eq!(fixture.store.len().unwrap(), corpus().len());
    let stored = fixture
        .store
        .get(&Chunk::stable_id("calendar.pdf", 1))
        .unwrap();
    assert_eq!(stored.embedding.len(), DIMS);
    assert!(stored.text.contains("November 20"));

    let documents = fixture.engine.list_documents().unwrap();
    let calendar = documents
        .iter()
        .find(|d| d.source_document == "calendar.pdf")
        .unwrap();
    assert_eq!(calendar.chunk_count, 2);
}

#[tokio::test]
async fn test_replace_drops_stale_chunks_of_the_document() {
    let fixture = indexed(MockClient::quoting(), EngineConfig::default()).await;

    let revised = vec![record("calendar.pdf", "calendar", 0, "Last day to drop a course: July 22")];
    let (removed, written) = fixture.engine.replace_records(revised).await.unwrap();

    assert_eq!((removed, written), (2, 1));
    assert_eq!(fixture.store.len().unwrap(), corpus().len() - 1);
    assert!(matches!(
        fixture.store.get(&Chunk::stable_id("calendar.pdf", 1)),
        Err(AppError::NotFound(_))
    ));
    let answer = fixture
        .engine
        .answer_question("What's the last day to drop a course?", &[])
        .await
        .unwrap();
    assert!(answer.text.contains("July 22"));
    assert!(!answer.text.contains("July 15"));
}

#[tokio::test]
async fn test_rejected_replacement_keeps_the_old_chunks() {
    let fixture = indexed(MockClient::quoting(), EngineConfig::default()).await;

    let mut bad = record("calendar.pdf", "calendar", 0, "Broken");
    bad.embedding = Some(vec![1.0; DIMS + 1]);
    let result = fixture.engine.replace_records(vec![bad]).await;

    assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
    assert_eq!(fixture.store.len().unwrap(), corpus().len());
    assert_eq!(fixture.engine.delete_document("directory.pdf").unwrap(), 1);
    assert_eq!(fixture.store.len().unwrap(), corpus().len() - 1);
}

#[tokio::test]
async fn test_supplied_embeddings_are_kept() {
    let fixture = fixture_with(MockClient::quoting(), EngineConfig::default());
    let mut vector = vec![0.0; DIMS];
    vector[3] = 1.0;

    let record = ChunkRecord {
        id: Some("notice-1".to_string()),
        text: "Campus closed on Friday".to_string(),
        embedding: Some(vector.clone()),
        source_document: "notice.pdf".to_string(),
        category: "general".to_string(),
        page_or_section: None,
        sequence_index: 0,
        ocr_confidence: None,
    };
    fixture.engine.index_records(vec![record]).await.unwrap();

    assert_eq!(fixture.store.get("notice-1").unwrap().embedding, vector);
}

#[test]
fn test_dimension_mismatch_rejects_batch() {
    let fixture = fixture_with(MockClient::quoting(), EngineConfig::default());

    let result = fixture.engine.index_chunks(vec![
        chunk("ok", "Valid chunk", vec![0.1; DIMS]),
        chunk("short", "Short vector", vec![0.1; 3]),
    ]);

    match result {
        Err(AppError::DimensionMismatch {
            chunk_id,
            expected,
            actual,
        }) => {
            assert_eq!(chunk_id, "short");
            assert_eq!(expected, DIMS);
            assert_eq!(actual, 3);
        }
        other => panic!("Expected DimensionMismatch, got {:?}", other),
    }
    assert!(fixture.store.is_empty().unwrap());
}

#[test]
fn test_embedder_must_match_store() {
    let result = QaEngine::new(
        EngineConfig::default(),
        EngineComponents {
            store: Arc::new(MemoryChunkStore::new(DIMS)),
            embedder: Arc::new(MockProvider::new(DIMS * 2)),
            reranker: Arc::new(LexicalReranker::new()),
            llm: Arc::new(MockClient::quoting()),
            model: "test-model".to_string(),
            prompts: PromptSet::builtin().unwrap(),
        },
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

proptest! {
    #[test]
    fn reindexing_keeps_one_copy(text in "[a-z]{3,12}( [a-z]{3,12}){0,6}", times in 1usize..5) {
        let fixture = fixture_with(MockClient::quoting(), EngineConfig::default());
        for _ in 0..times {
            fixture
                .engine
                .index_chunks(vec![chunk("notice-1", &text, vec![0.25; DIMS])])
                .unwrap();
        }
        prop_assert_eq!(fixture.store.len().unwrap(), 1);
        prop_assert_eq!(fixture.store.get("notice-1").unwrap().text, text);
    }
}
