//! LLM integration crate for Citewise.
//!
//! A provider-agnostic abstraction over chat-style language models. The
//! answer synthesizer only sees the [`LlmClient`] trait, so tests and
//! offline runs can swap in the scripted [`MockClient`].
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Mock**: Deterministic replies for tests
//!
//! # Example
//! ```no_run
//! use citewise_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new()?;
//! let request = LlmRequest::new("When is the fee due?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{
    LlmClient, LlmMessage, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage, Role,
};
pub use factory::create_client;
pub use providers::{MockClient, OllamaClient};
