//! Embedding providers.
//!
//! The retriever embeds questions and the engine embeds chunk records that
//! arrive without a vector. Both go through [`EmbeddingProvider`].

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{MockProvider, OllamaProvider};
