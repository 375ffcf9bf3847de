//! Error types for Citewise.
//!
//! This module defines a unified error enum that covers every error category
//! in the workspace: configuration, I/O, language model, knowledge store,
//! prompt rendering, and the question-answering taxonomy (dimension
//! mismatches, unknown chunks, empty function results and model timeouts).

use thiserror::Error;

/// Unified error type for Citewise.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Chunk store and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An embedding does not have the dimensionality of the index.
    #[error("Embedding dimension mismatch for chunk '{chunk_id}': expected {expected}, got {actual}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },

    /// Lookup of a chunk id that is not in the store.
    #[error("Chunk not found: {0}")]
    NotFound(String),

    /// A structured function found nothing to answer with.
    #[error("No match for {function}: {detail}")]
    NoMatch { function: String, detail: String },

    /// The language model did not answer before the deadline.
    #[error("Language model timed out after {timeout_secs}s during {stage}")]
    ModelTimeout { stage: String, timeout_secs: u64 },

    /// A failure inside the question pipeline, with the context a caller needs
    /// to log or retry the request.
    #[error("Query failed at {stage} (intent: {intent}, question: {question:?}): {source}")]
    Query {
        stage: String,
        intent: String,
        question: String,
        #[source]
        source: Box<AppError>,
    },

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Wrap an error with the pipeline context it occurred in.
    pub fn in_query(
        self,
        stage: impl Into<String>,
        intent: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        AppError::Query {
            stage: stage.into(),
            intent: intent.into(),
            question: question.into(),
            source: Box::new(self),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ModelTimeout { .. } => true,
            AppError::Query { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The innermost error, looking through `Query` wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Query { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
