//! Answer synthesis: grounded prompt, model call, citations and grounding.

use crate::config::{SynthesisConfig, FALLBACK_ANSWER};
use crate::functions::{Evidence, SynthesisTask};
use crate::grounding::GroundingChecker;
use crate::text::estimate_tokens;
use crate::types::{Answer, AnswerEvent, Chunk, Citation, HistoryTurn, IntentKind, Parameters, RetrievalCandidate};
use citewise_core::{AppError, AppResult};
use citewise_llm::{LlmClient, LlmRequest, LlmStream};
use citewise_prompt::{build_prompt, PromptSet};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Phrase that marks a model's refusal to answer from the sources.
const FALLBACK_MARKER: &str = "couldn't find an authoritative answer";

const STAGE: &str = "synthesis";

/// Stream of answer events; the last item is `Completed` unless an error
/// ends the stream first.
pub type AnswerStream = BoxStream<'static, AppResult<AnswerEvent>>;

/// A chunk supplied to synthesis, in rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSource {
    pub chunk: Chunk,
    pub group: Option<String>,
}

impl From<RetrievalCandidate> for ContextSource {
    fn from(candidate: RetrievalCandidate) -> Self {
        Self {
            chunk: candidate.chunk,
            group: None,
        }
    }
}

impl From<Evidence> for ContextSource {
    fn from(evidence: Evidence) -> Self {
        Self {
            chunk: evidence.chunk,
            group: evidence.group,
        }
    }
}

/// How an answer was reached, carried into the final [`Answer`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerMeta {
    pub intent: IntentKind,
    pub parameters: Parameters,
    pub used_function: bool,
}

impl AnswerMeta {
    /// The fixed answer for questions the documents do not cover.
    pub fn fallback(&self) -> Answer {
        Answer {
            text: FALLBACK_ANSWER.to_string(),
            citations: Vec::new(),
            is_grounded: false,
            used_function: self.used_function,
            intent: self.intent,
            parameters: self.parameters.clone(),
            retrieved_count: 0,
        }
    }
}

#[derive(Serialize)]
struct SourceVar<'a> {
    rank: usize,
    source: &'a str,
    section: Option<&'a str>,
    text: &'a str,
    policy: Option<&'a str>,
}

#[derive(Serialize)]
struct PromptVars<'a> {
    question: &'a str,
    sources: Vec<SourceVar<'a>>,
    history: &'a [HistoryTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    policy_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy_a: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy_b: Option<&'a str>,
}

/// Turns model output into an [`Answer`]: fallback detection, citation
/// extraction and the grounding check.
#[derive(Debug, Clone)]
struct Finalizer {
    checker: GroundingChecker,
    context: Vec<ContextSource>,
    meta: AnswerMeta,
}

impl Finalizer {
    fn finish(&self, raw: &str) -> Answer {
        let raw = raw.trim();
        if raw.is_empty() || raw.to_lowercase().contains(FALLBACK_MARKER) {
            info!(intent = %self.meta.intent, "Model found no answer in the sources");
            let mut answer = self.meta.fallback();
            answer.retrieved_count = self.context.len();
            return answer;
        }

        let texts: Vec<&str> = self.context.iter().map(|s| s.chunk.text.as_str()).collect();
        let report = self.checker.check(raw, &texts);

        let citations: Vec<Citation> = report
            .cited
            .iter()
            .filter_map(|&rank| {
                self.context
                    .get(rank - 1)
                    .map(|s| Citation::from_chunk(&s.chunk, rank))
            })
            .collect();

        let text = if report.is_grounded {
            raw.to_string()
        } else {
            warn!(
                score = report.score,
                intent = %self.meta.intent,
                "Answer failed grounding check"
            );
            format!("{}\n\n{}", raw, self.checker.disclaimer())
        };

        info!(
            intent = %self.meta.intent,
            citations = citations.len(),
            grounded = report.is_grounded,
            score = report.score,
            "Answer synthesized"
        );

        Answer {
            text,
            citations,
            is_grounded: report.is_grounded,
            used_function: self.meta.used_function,
            intent: self.meta.intent,
            parameters: self.meta.parameters.clone(),
            retrieved_count: self.context.len(),
        }
    }
}

enum Phase {
    Streaming(LlmStream),
    Finishing,
    Done,
}

struct StreamState {
    phase: Phase,
    buffer: String,
    finalizer: Finalizer,
    timeout: Duration,
}

/// Builds grounded prompts and turns model output into cited answers.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompts: PromptSet,
    config: SynthesisConfig,
    checker: GroundingChecker,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompts: PromptSet,
        config: SynthesisConfig,
        checker: GroundingChecker,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            prompts,
            config,
            checker,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.model_timeout_secs)
    }

    fn timeout_error(&self) -> AppError {
        AppError::ModelTimeout {
            stage: STAGE.to_string(),
            timeout_secs: self.config.model_timeout_secs,
        }
    }

    /// Keep the highest-ranked sources that fit the token budget of `task`.
    /// The top source is always kept.
    pub fn select_context(&self, sources: Vec<ContextSource>, task: &SynthesisTask) -> Vec<ContextSource> {
        let budget = match task {
            SynthesisTask::Verbatim => self.config.max_context_tokens,
            SynthesisTask::Summarize { .. } | SynthesisTask::Compare { .. } => {
                self.config.summary_max_tokens
            }
        };

        let total = sources.len();
        let mut used = 0usize;
        let mut selected = Vec::with_capacity(total);
        for source in sources {
            let cost = estimate_tokens(&source.chunk.text);
            if !selected.is_empty() && used + cost > budget {
                break;
            }
            used += cost;
            selected.push(source);
        }

        if selected.len() < total {
            debug!(kept = selected.len(), dropped = total - selected.len(), budget, "Trimmed context to budget");
        }
        selected
    }

    /// Render the prompt for `task` over `context`.
    pub fn build_request(
        &self,
        question: &str,
        history: &[HistoryTurn],
        context: &[ContextSource],
        task: &SynthesisTask,
    ) -> AppResult<LlmRequest> {
        let recent = &history[history.len().saturating_sub(self.config.history_turns)..];

        let sources = context
            .iter()
            .enumerate()
            .map(|(i, s)| SourceVar {
                rank: i + 1,
                source: &s.chunk.source_document,
                section: s.chunk.page_or_section.as_deref(),
                text: &s.chunk.text,
                policy: s.group.as_deref(),
            })
            .collect();

        let mut vars = PromptVars {
            question,
            sources,
            history: recent,
            policy_name: None,
            policy_a: None,
            policy_b: None,
        };

        let definition = match task {
            SynthesisTask::Verbatim => &self.prompts.answer,
            SynthesisTask::Summarize { policy_name } => {
                vars.policy_name = Some(policy_name.as_str());
                &self.prompts.summary
            }
            SynthesisTask::Compare { policy_a, policy_b } => {
                vars.policy_a = Some(policy_a.as_str());
                vars.policy_b = Some(policy_b.as_str());
                &self.prompts.comparison
            }
        };

        let built = build_prompt(definition, &vars)?;
        let mut request = LlmRequest::new(built.user, self.model.clone())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        Ok(request)
    }

    /// Quote each source as its own paragraph with its marker.
    fn verbatim_text(context: &[ContextSource]) -> String {
        context
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{} [{}]", s.chunk.text.trim(), i + 1))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn finalizer(&self, context: Vec<ContextSource>, meta: AnswerMeta) -> Finalizer {
        Finalizer {
            checker: self.checker.clone(),
            context,
            meta,
        }
    }

    /// Quote function evidence without the model.
    pub fn render_verbatim(&self, context: Vec<ContextSource>, meta: AnswerMeta) -> Answer {
        let text = Self::verbatim_text(&context);
        self.finalizer(context, meta).finish(&text)
    }

    /// Answer from `context` with one model call.
    ///
    /// `Verbatim` with no model involvement is handled by
    /// [`render_verbatim`](Self::render_verbatim); here it selects the
    /// grounded answer prompt.
    pub async fn synthesize(
        &self,
        question: &str,
        history: &[HistoryTurn],
        context: Vec<ContextSource>,
        task: &SynthesisTask,
        meta: AnswerMeta,
    ) -> AppResult<Answer> {
        if context.is_empty() {
            return Ok(meta.fallback());
        }

        let request = self.build_request(question, history, &context, task)?;
        debug!(sources = context.len(), provider = self.llm.provider_name(), "Calling model");

        let response = tokio::time::timeout(self.timeout(), self.llm.complete(&request))
            .await
            .map_err(|_| self.timeout_error())??;

        Ok(self.finalizer(context, meta).finish(&response.content))
    }

    /// Streaming variant of [`synthesize`](Self::synthesize).
    ///
    /// Each wait for the next model token is bounded by the model timeout.
    /// Dropping the stream stops reading model output.
    pub async fn stream(
        &self,
        question: &str,
        history: &[HistoryTurn],
        context: Vec<ContextSource>,
        task: &SynthesisTask,
        meta: AnswerMeta,
    ) -> AppResult<AnswerStream> {
        if context.is_empty() {
            return Ok(completed(meta.fallback()));
        }

        let request = self.build_request(question, history, &context, task)?.with_streaming();
        let inner = tokio::time::timeout(self.timeout(), self.llm.stream(&request))
            .await
            .map_err(|_| self.timeout_error())??;

        let state = StreamState {
            phase: Phase::Streaming(inner),
            buffer: String::new(),
            finalizer: self.finalizer(context, meta),
            timeout: self.timeout(),
        };
        let timeout_secs = self.config.model_timeout_secs;

        Ok(stream::unfold(state, move |mut st| async move {
            loop {
                match std::mem::replace(&mut st.phase, Phase::Done) {
                    Phase::Done => return None,
                    Phase::Finishing => {
                        let answer = st.finalizer.finish(&st.buffer);
                        return Some((Ok(AnswerEvent::Completed(answer)), st));
                    }
                    Phase::Streaming(mut inner) => {
                        let next = match tokio::time::timeout(st.timeout, inner.next()).await {
                            Ok(next) => next,
                            Err(_) => {
                                let err = AppError::ModelTimeout {
                                    stage: STAGE.to_string(),
                                    timeout_secs,
                                };
                                return Some((Err(err), st));
                            }
                        };

                        match next {
                            None => st.phase = Phase::Finishing,
                            Some(Err(e)) => return Some((Err(e), st)),
                            Some(Ok(chunk)) => {
                                st.phase = if chunk.done {
                                    Phase::Finishing
                                } else {
                                    Phase::Streaming(inner)
                                };
                                if !chunk.content.is_empty() {
                                    st.buffer.push_str(&chunk.content);
                                    return Some((Ok(AnswerEvent::Token(chunk.content)), st));
                                }
                            }
                        }
                    }
                }
            }
        })
        .boxed())
    }

    /// Streaming form of [`render_verbatim`](Self::render_verbatim): one
    /// token per quoted paragraph, then the answer.
    pub fn stream_verbatim(&self, context: Vec<ContextSource>, meta: AnswerMeta) -> AnswerStream {
        let text = Self::verbatim_text(&context);
        let answer = self.finalizer(context, meta).finish(&text);

        let paragraphs: Vec<String> = text.split("\n\n").map(|p| format!("{}\n\n", p)).collect();
        let events: Vec<AppResult<AnswerEvent>> = paragraphs
            .into_iter()
            .map(|p| Ok(AnswerEvent::Token(p)))
            .chain(std::iter::once(Ok(AnswerEvent::Completed(answer))))
            .collect();
        stream::iter(events).boxed()
    }
}

/// A stream holding only the final answer.
pub fn completed(answer: Answer) -> AnswerStream {
    stream::iter(vec![Ok(AnswerEvent::Completed(answer))]).boxed()
}
