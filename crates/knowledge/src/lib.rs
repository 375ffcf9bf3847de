//! Citation-grounded question answering over institutional documents.
//!
//! A question is routed to a structured lookup (fees, academic calendar,
//! policy summary or comparison) or to hybrid retrieval over the chunk
//! index. The selected fragments are handed to the language model with a
//! grounded prompt, and the answer comes back with numbered citations and a
//! grounding verdict.
//!
//! ```text
//! question -> IntentRouter -> FunctionRegistry | HybridRetriever
//!          -> AnswerSynthesizer -> GroundingChecker -> Answer
//! ```

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod functions;
pub mod grounding;
pub mod rerank;
pub mod retriever;
pub mod router;
pub mod store;
pub mod synthesizer;
pub mod text;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{EngineConfig, FALLBACK_ANSWER};
pub use embeddings::{create_provider, EmbeddingProvider, MockProvider, OllamaProvider};
pub use engine::{EngineComponents, QaEngine};
pub use functions::{FunctionDescription, FunctionRegistry};
pub use grounding::{GroundingChecker, GroundingReport};
pub use rerank::{LexicalReranker, Reranker};
pub use retriever::HybridRetriever;
pub use router::IntentRouter;
pub use store::{ChunkStore, MemoryChunkStore, SqliteChunkStore};
pub use synthesizer::{AnswerStream, AnswerSynthesizer};
pub use types::{
    Answer, AnswerEvent, Chunk, ChunkFilter, ChunkRecord, Citation, CitationStyle,
    DocumentSummary, HistoryTurn, Intent, IntentKind, Parameters, RetrievalCandidate,
};
