//! Ollama embedding provider.
//!
//! Uses the batch endpoint of a local Ollama runtime with models such as
//! `nomic-embed-text` or `all-minilm`.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::config::EmbeddingConfig;
use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use citewise_core::{AppError, AppResult};
use citewise_llm::providers::ollama::DEFAULT_OLLAMA_URL;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const EMBED_ENDPOINT: &str = "/api/embed";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Ollama embedding provider using local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create the provider and verify the model answers with vectors of the
    /// configured size.
    ///
    /// # Errors
    /// * `AppError::Llm` - If Ollama is not reachable or the model is missing
    /// * `AppError::DimensionMismatch` - If the model's vectors have another size
    pub async fn new(config: &EmbeddingConfig) -> AppResult<Self> {
        let provider = Self::unverified(config)?;
        provider.verify_connection().await?;
        Ok(provider)
    }

    fn unverified(config: &EmbeddingConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        let base_url = config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    #[instrument(skip(self), fields(model = %self.model))]
    async fn verify_connection(&self) -> AppResult<()> {
        debug!("Verifying Ollama connection at {}", self.base_url);

        self.request(&["connection check".to_string()])
            .await
            .map_err(|e| match e {
                AppError::DimensionMismatch { .. } => e,
                other => AppError::Llm(format!(
                    "Ollama not available at {} ({}). Ensure Ollama is running and run: ollama pull {}",
                    self.base_url, other, self.model
                )),
            })?;

        debug!("Ollama embedding model '{}' ready", self.model);
        Ok(())
    }

    async fn request(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let url = format!("{}{}", self.base_url, EMBED_ENDPOINT);
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to read Ollama response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|r| r.error)
                .unwrap_or(text);
            return Err(AppError::Llm(format!("Ollama API error ({}): {}", status, message)));
        }

        self.parse_response(&text, texts.len())
    }

    fn parse_response(&self, body: &str, expected: usize) -> AppResult<Vec<Vec<f32>>> {
        let parsed: EmbedResponse = serde_json::from_str(body)
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        if parsed.embeddings.len() != expected {
            return Err(AppError::Llm(format!(
                "Ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                expected
            )));
        }

        if let Some(bad) = parsed.embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(AppError::DimensionMismatch {
                chunk_id: format!("<{} output>", self.model),
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding batch of {} texts", texts.len());
        self.request(texts).await
    }
}
