//! Ollama LLM provider implementation.
//!
//! Talks to the chat endpoint of a local Ollama runtime.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use citewise_core::{AppError, AppResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const CHAT_ENDPOINT: &str = "/api/chat";

/// Connection establishment timeout; generation deadlines are enforced by callers.
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaChatResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }

    fn into_text(self) -> String {
        self.message.map(|m| m.content).unwrap_or_default()
    }
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client against `http://localhost:11434`.
    pub fn new() -> AppResult<Self> {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn to_chat_request(&self, request: &LlmRequest, stream: bool) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for message in &request.messages {
            messages.push(OllamaMessage {
                role: match message.role {
                    crate::client::Role::User => "user".to_string(),
                    crate::client::Role::Assistant => "assistant".to_string(),
                },
                content: message.content.clone(),
            });
        }

        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };

        OllamaChatRequest {
            model: request.model.clone(),
            messages,
            stream,
            options,
        }
    }

    async fn post(&self, body: &OllamaChatRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, CHAT_ENDPOINT);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

fn parse_stream_line(line: &str) -> AppResult<LlmStreamChunk> {
    let parsed: OllamaChatResponse = serde_json::from_str(line)
        .map_err(|e| AppError::Llm(format!("Failed to parse chunk: {}", e)))?;

    let usage = parsed.done.then(|| parsed.usage());
    let done = parsed.done;
    Ok(LlmStreamChunk {
        content: parsed.into_text(),
        done,
        usage,
    })
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending chat completion to Ollama");

        let body = self.to_chat_request(request, false);
        let response = self.post(&body).await?;

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        let usage = parsed.usage();
        let model = parsed.model.clone();
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Received completion from Ollama"
        );

        Ok(LlmResponse {
            content: parsed.into_text(),
            model,
            usage,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming chat with Ollama");

        let body = self.to_chat_request(request, true);
        let response = self.post(&body).await?;

        // Ollama sends newline-delimited JSON; a network chunk may end mid-line.
        let stream = response
            .bytes_stream()
            .scan(String::new(), |buffer, result| {
                let mut out: Vec<AppResult<LlmStreamChunk>> = Vec::new();
                match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim();
                            if !line.is_empty() {
                                out.push(parse_stream_line(line));
                            }
                        }
                    }
                    Err(e) => out.push(Err(AppError::Llm(format!("Stream error: {}", e)))),
                }
                futures::future::ready(Some(futures::stream::iter(out)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
