//! End-to-end tests over the assembled engine.

mod indexing;

use crate::config::EngineConfig;
use crate::embeddings::MockProvider;
use crate::engine::{EngineComponents, QaEngine};
use crate::rerank::LexicalReranker;
use crate::store::MemoryChunkStore;
use crate::types::ChunkRecord;
use citewise_llm::MockClient;
use citewise_prompt::PromptSet;
use std::sync::Arc;

pub(crate) const DIMS: usize = 64;

fn record(source: &str, category: &str, sequence_index: u32, text: &str) -> ChunkRecord {
    ChunkRecord {
        id: None,
        text: text.to_string(),
        embedding: None,
        source_document: source.to_string(),
        category: category.to_string(),
        page_or_section: None,
        sequence_index,
        ocr_confidence: None,
    }
}

/// A small institutional corpus: calendar, fees, policies and a directory.
pub(crate) fn corpus() -> Vec<ChunkRecord> {
    vec![
        record("calendar.pdf", "calendar", 0, "Last day to drop a course: July 15"),
        record("calendar.pdf", "calendar", 1, "Semester examinations begin on November 20"),
        record("fees.pdf", "fees", 0, "MBA tuition fee is Rs 250000 per semester"),
        record("handbook.pdf", "policies", 0, "Library fine is Rs 10 per day for late returns"),
        record("handbook.pdf", "policies", 1, "Hostel gates close at 10 PM on weekdays"),
        record("directory.pdf", "general", 0, "The dean of students is Dr. Rao, office in block A"),
    ]
}

pub(crate) struct Fixture {
    pub engine: QaEngine,
    pub store: Arc<MemoryChunkStore>,
    pub llm: Arc<MockClient>,
}

pub(crate) fn fixture_with(llm: MockClient, config: EngineConfig) -> Fixture {
    let store = Arc::new(MemoryChunkStore::new(DIMS));
    let llm = Arc::new(llm);
    let engine = QaEngine::new(
        config,
        EngineComponents {
            store: store.clone(),
            embedder: Arc::new(MockProvider::new(DIMS)),
            reranker: Arc::new(LexicalReranker::new()),
            llm: llm.clone(),
            model: "test-model".to_string(),
            prompts: PromptSet::builtin().unwrap(),
        },
    )
    .unwrap();

    Fixture { engine, store, llm }
}

/// Engine over the indexed corpus.
pub(crate) async fn indexed(llm: MockClient, config: EngineConfig) -> Fixture {
    let fixture = fixture_with(llm, config);
    fixture.engine.index_records(corpus()).await.unwrap();
    fixture
}
