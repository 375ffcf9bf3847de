//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a shareable client.

use crate::client::LlmClient;
use crate::providers::{ollama::DEFAULT_OLLAMA_URL, MockClient, OllamaClient};
use citewise_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama" or "mock")
/// * `endpoint` - Optional custom endpoint URL
///
/// The "mock" provider answers by quoting the first context block, which
/// makes offline runs of the full pipeline reproducible.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown and
/// `AppError::Llm` if client initialization fails.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            let client = OllamaClient::with_base_url(base_url)?;
            Ok(Arc::new(client))
        }
        "mock" => Ok(Arc::new(MockClient::quoting())),
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
