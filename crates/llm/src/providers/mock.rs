//! Scripted LLM provider for tests and offline runs.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use citewise_core::{AppError, AppResult};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const NOTHING_TO_QUOTE: &str = "I couldn't find an authoritative answer in the available documents.";

#[derive(Debug)]
enum Script {
    /// Replies handed out in order; the last one repeats.
    Replies(VecDeque<String>),
    /// Answer by quoting the first numbered context block of the prompt.
    QuoteFirstSource,
}

/// Deterministic stand-in for a language model.
///
/// Records every request it receives so tests can inspect the prompt.
#[derive(Debug)]
pub struct MockClient {
    script: Mutex<Script>,
    delay: Option<Duration>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockClient {
    /// Always reply with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::scripted(vec![text.into()])
    }

    /// Reply with each entry in turn, repeating the last one.
    pub fn scripted(replies: Vec<String>) -> Self {
        Self::with_script(Script::Replies(replies.into()))
    }

    /// Reply with the text of context block `[1]` followed by a `[1]` marker.
    pub fn quoting() -> Self {
        Self::with_script(Script::QuoteFirstSource)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering (and before every streamed token).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, request: &LlmRequest) -> AppResult<String> {
        self.requests
            .lock()
            .map_err(|_| AppError::Llm("Mock request log poisoned".to_string()))?
            .push(request.clone());

        let mut script = self
            .script
            .lock()
            .map_err(|_| AppError::Llm("Mock script poisoned".to_string()))?;

        Ok(match &mut *script {
            Script::Replies(replies) => {
                if replies.len() > 1 {
                    replies.pop_front().unwrap_or_default()
                } else {
                    replies.front().cloned().unwrap_or_default()
                }
            }
            Script::QuoteFirstSource => quote_first_source(request.prompt()),
        })
    }
}

fn quote_first_source(prompt: &str) -> String {
    let mut lines = prompt.lines().skip_while(|l| !l.trim_start().starts_with("[1]"));
    if lines.next().is_none() {
        return NOTHING_TO_QUOTE.to_string();
    }

    let body: Vec<&str> = lines
        .take_while(|l| !l.trim().is_empty())
        .map(str::trim)
        .collect();

    if body.is_empty() {
        NOTHING_TO_QUOTE.to_string()
    } else {
        format!("{} [1]", body.join(" "))
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[async_trait::async_trait]
impl LlmClient for MockClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let reply = self.next_reply(request)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(LlmResponse {
            usage: LlmUsage::new(word_count(request.prompt()), word_count(&reply)),
            content: reply,
            model: request.model.clone(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let reply = self.next_reply(request)?;
        let delay = self.delay;
        let usage = LlmUsage::new(word_count(request.prompt()), word_count(&reply));

        let mut pieces: Vec<LlmStreamChunk> = reply
            .split_inclusive(' ')
            .map(|piece| LlmStreamChunk {
                content: piece.to_string(),
                done: false,
                usage: None,
            })
            .collect();
        pieces.push(LlmStreamChunk {
            content: String::new(),
            done: true,
            usage: Some(usage),
        });

        let stream = futures::stream::iter(pieces).then(move |chunk| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(chunk)
        });

        Ok(Box::pin(stream))
    }
}
