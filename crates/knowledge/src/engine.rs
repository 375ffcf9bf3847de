//! Question answering over an indexed document corpus.
//!
//! [`QaEngine`] owns every component a query touches. Components are shared
//! read-only between concurrent queries; indexing goes through the store's
//! own write path.

use crate::config::EngineConfig;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::functions::{FunctionDescription, FunctionRegistry, SynthesisTask};
use crate::grounding::GroundingChecker;
use crate::rerank::{LexicalReranker, Reranker};
use crate::retriever::HybridRetriever;
use crate::router::IntentRouter;
use crate::store::{validate_batch, ChunkStore, SqliteChunkStore};
use crate::synthesizer::{completed, AnswerMeta, AnswerStream, AnswerSynthesizer, ContextSource};
use crate::types::{
    Answer, Chunk, ChunkFilter, ChunkRecord, DocumentSummary, HistoryTurn, Intent, IntentKind,
    RetrievalCandidate,
};
use citewise_core::config::AppConfig;
use citewise_core::{AppError, AppResult};
use citewise_llm::{create_client, LlmClient};
use citewise_prompt::PromptSet;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Texts embedded per provider call while indexing.
const EMBED_BATCH_SIZE: usize = 32;

/// The pluggable parts of an engine.
pub struct EngineComponents {
    pub store: Arc<dyn ChunkStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Arc<dyn Reranker>,
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub prompts: PromptSet,
}

/// What a routed question will be answered with.
enum Plan {
    Fallback(AnswerMeta),
    Verbatim(Vec<ContextSource>, AnswerMeta),
    Model {
        context: Vec<ContextSource>,
        task: SynthesisTask,
        meta: AnswerMeta,
    },
}

pub struct QaEngine {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    router: IntentRouter,
    registry: FunctionRegistry,
    retriever: HybridRetriever,
    synthesizer: AnswerSynthesizer,
    config: EngineConfig,
}

impl QaEngine {
    /// Assemble an engine from its components.
    ///
    /// # Errors
    /// * `AppError::Config` - If the config is invalid or the embedder and
    ///   store disagree on dimensions
    pub fn new(config: EngineConfig, components: EngineComponents) -> AppResult<Self> {
        config.validate()?;

        let EngineComponents {
            store,
            embedder,
            reranker,
            llm,
            model,
            prompts,
        } = components;

        if embedder.dimensions() != store.dimensions() {
            return Err(AppError::Config(format!(
                "Embedding provider '{}' produces {} dimensions but the index stores {}",
                embedder.provider_name(),
                embedder.dimensions(),
                store.dimensions()
            )));
        }

        let retriever = HybridRetriever::new(
            store.clone(),
            embedder.clone(),
            reranker,
            config.retrieval.clone(),
        );
        let synthesizer = AnswerSynthesizer::new(
            llm,
            model,
            prompts,
            config.synthesis.clone(),
            GroundingChecker::new(config.grounding.clone()),
        );

        Ok(Self {
            store,
            embedder,
            router: IntentRouter::new(),
            registry: FunctionRegistry::standard(&config),
            retriever,
            synthesizer,
            config,
        })
    }

    /// Engine for a workspace: SQLite index under `.citewise/`, engine config
    /// from `.citewise/engine.yaml` (see [`EngineConfig::for_app`]), prompt
    /// overrides from `.citewise/prompts/`.
    pub async fn from_workspace(app: &AppConfig) -> AppResult<Self> {
        let config = EngineConfig::for_app(app)?;

        app.ensure_state_dir()?;
        let store = SqliteChunkStore::open(&app.index_path(), config.embedding.dimensions)?;
        let embedder = create_provider(&config.embedding).await?;
        let llm = create_client(&app.provider, app.endpoint.as_deref())?;
        let prompts = PromptSet::load(&app.workspace)?;

        info!(
            provider = %app.provider,
            model = %app.model,
            embedder = embedder.provider_name(),
            index = ?app.index_path(),
            "Engine ready"
        );

        Self::new(
            config,
            EngineComponents {
                store: Arc::new(store),
                embedder,
                reranker: Arc::new(LexicalReranker::new()),
                llm,
                model: app.model.clone(),
                prompts,
            },
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify a question without answering it.
    pub fn route(&self, question: &str) -> Intent {
        self.router.route(question)
    }

    /// The structured functions questions can be routed to.
    pub fn functions(&self) -> Vec<FunctionDescription> {
        self.registry.describe()
    }

    /// Hybrid retrieval only.
    pub async fn search(
        &self,
        question: &str,
        filter: Option<&ChunkFilter>,
        k: usize,
    ) -> AppResult<Vec<RetrievalCandidate>> {
        self.retriever.retrieve(question, filter, k).await
    }

    /// Insert or replace chunks. Returns the number written.
    pub fn index_chunks(&self, chunks: Vec<Chunk>) -> AppResult<usize> {
        let count = self.store.upsert(chunks)?;
        info!(count, "Indexed chunks");
        Ok(count)
    }

    /// Index chunk records, computing missing embeddings and ids.
    pub async fn index_records(&self, records: Vec<ChunkRecord>) -> AppResult<usize> {
        let chunks = self.embed_records(records).await?;
        self.index_chunks(chunks)
    }

    /// Index chunk records after dropping every chunk already stored for
    /// their source documents. Returns `(removed, written)`.
    ///
    /// The batch is embedded and validated before anything is deleted, so a
    /// rejected batch leaves the index untouched.
    pub async fn replace_records(&self, records: Vec<ChunkRecord>) -> AppResult<(usize, usize)> {
        let chunks = self.embed_records(records).await?;
        validate_batch(&chunks, self.store.dimensions())?;
        let sources: BTreeSet<&str> = chunks.iter().map(|c| c.source_document.as_str()).collect();

        let mut removed = 0;
        for source in sources {
            removed += self.delete_document(source)?;
        }

        let written = self.index_chunks(chunks)?;
        Ok((removed, written))
    }

    /// Remove one document from the index. Returns the number of chunks removed.
    pub fn delete_document(&self, source_document: &str) -> AppResult<usize> {
        let removed = self.store.delete_document(source_document)?;
        info!(source_document, removed, "Deleted document");
        Ok(removed)
    }

    async fn embed_records(&self, records: Vec<ChunkRecord>) -> AppResult<Vec<Chunk>> {
        let missing: Vec<String> = records
            .iter()
            .filter(|r| r.embedding.is_none())
            .map(|r| r.text.clone())
            .collect();

        let mut computed = Vec::with_capacity(missing.len());
        for batch in missing.chunks(EMBED_BATCH_SIZE) {
            computed.extend(self.embedder.embed_batch(batch).await?);
        }
        debug!(embedded = computed.len(), total = records.len(), "Embedded records");

        let mut computed = computed.into_iter();
        records
            .into_iter()
            .map(|mut record| {
                let embedding = match record.embedding.take() {
                    Some(embedding) => embedding,
                    None => computed.next().ok_or_else(|| {
                        AppError::Knowledge("Embedding provider returned too few vectors".to_string())
                    })?,
                };
                Ok(record.into_chunk(embedding))
            })
            .collect()
    }

    pub fn list_documents(&self) -> AppResult<Vec<DocumentSummary>> {
        self.store.documents()
    }

    async fn plan(&self, question: &str) -> AppResult<Plan> {
        let intent = self.router.route(question);
        info!(intent = %intent.kind, parameters = ?intent.parameters, "Routed question");

        if let Some(handler) = self.registry.get(intent.kind) {
            let meta = AnswerMeta {
                intent: intent.kind,
                parameters: intent.parameters.clone(),
                used_function: true,
            };

            match handler.handle(&intent.parameters, question, self.store.as_ref()) {
                Ok(result) => {
                    let sources = result.chunks.into_iter().map(ContextSource::from).collect();
                    let context = self.synthesizer.select_context(sources, &result.task);
                    info!(function = %result.function, sources = context.len(), "Function matched");
                    return Ok(match result.task {
                        SynthesisTask::Verbatim => Plan::Verbatim(context, meta),
                        task => Plan::Model {
                            context,
                            task,
                            meta,
                        },
                    });
                }
                // Only a trigger word routed here; the question may be answered elsewhere.
                Err(AppError::NoMatch { function, detail }) if intent.parameters.is_empty() => {
                    debug!(%function, %detail, "Function found nothing, retrying with retrieval");
                }
                Err(AppError::NoMatch { function, detail }) => {
                    warn!(%function, %detail, "Function found no matching documents");
                    return Ok(Plan::Fallback(meta));
                }
                Err(e) => return Err(e.in_query("function", intent.kind.as_str(), question)),
            }
        }

        let meta = AnswerMeta {
            intent: intent.kind,
            parameters: intent.parameters.clone(),
            used_function: false,
        };
        let k = self.config.retrieval.top_k;

        let candidates = async {
            if intent.kind == IntentKind::PolicySearch {
                let filter = ChunkFilter::category(self.config.categories.policies.clone());
                let filtered = self.retriever.retrieve(question, Some(&filter), k).await?;
                if !filtered.is_empty() {
                    return Ok(filtered);
                }
                debug!("No policy documents matched, retrying without filter");
            }
            self.retriever.retrieve(question, None, k).await
        }
        .await
        .map_err(|e: AppError| e.in_query("retrieval", intent.kind.as_str(), question))?;

        info!(candidates = candidates.len(), "Retrieved candidates");
        if candidates.is_empty() {
            return Ok(Plan::Fallback(meta));
        }

        let sources = candidates.into_iter().map(ContextSource::from).collect();
        let task = SynthesisTask::Verbatim;
        Ok(Plan::Model {
            context: self.synthesizer.select_context(sources, &task),
            task,
            meta,
        })
    }

    /// Answer a question with citations.
    ///
    /// Questions the documents do not cover get the fixed fallback answer,
    /// not an error.
    pub async fn answer_question(&self, question: &str, history: &[HistoryTurn]) -> AppResult<Answer> {
        let span = info_span!("query", id = %Uuid::new_v4());
        async move {
            match self.plan(question).await? {
                Plan::Fallback(meta) => Ok(meta.fallback()),
                Plan::Verbatim(context, meta) => Ok(self.synthesizer.render_verbatim(context, meta)),
                Plan::Model {
                    context,
                    task,
                    meta,
                } => {
                    let intent = meta.intent;
                    self.synthesizer
                        .synthesize(question, history, context, &task, meta)
                        .await
                        .map_err(|e| e.in_query("synthesis", intent.as_str(), question))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Streaming form of [`answer_question`](Self::answer_question).
    ///
    /// The final `Completed` event carries the same answer
    /// `answer_question` returns.
    pub async fn stream_answer(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> AppResult<AnswerStream> {
        let span = info_span!("query", id = %Uuid::new_v4(), streaming = true);
        async move {
            match self.plan(question).await? {
                Plan::Fallback(meta) => Ok(completed(meta.fallback())),
                Plan::Verbatim(context, meta) => Ok(self.synthesizer.stream_verbatim(context, meta)),
                Plan::Model {
                    context,
                    task,
                    meta,
                } => {
                    let intent = meta.intent;
                    let owned_question = question.to_string();
                    let stream = self
                        .synthesizer
                        .stream(question, history, context, &task, meta)
                        .await
                        .map_err(|e| e.in_query("synthesis", intent.as_str(), question))?;
                    Ok(stream
                        .map(move |event| {
                            event.map_err(|e| {
                                e.in_query("synthesis", intent.as_str(), owned_question.as_str())
                            })
                        })
                        .boxed())
                }
            }
        }
        .instrument(span)
        .await
    }
}
