//! Structured functions: deterministic lookups that bypass hybrid retrieval.
//!
//! Each handler reads the chunk store directly, restricted to one document
//! category, and returns the evidence together with what the synthesizer
//! should do with it.

pub mod calendar;
pub mod comparison;
pub mod fee;
pub mod summary;

pub use calendar::CalendarLookup;
pub use comparison::PolicyComparison;
pub use fee::FeeLookup;
pub use summary::PolicySummary;

use crate::config::EngineConfig;
use crate::store::ChunkStore;
use crate::text::{keyword_score, mentions, query_terms, term_counts};
use crate::types::{Chunk, ChunkFilter, IntentKind, Parameters};
use citewise_core::{AppError, AppResult};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A chunk selected by a function, with its lookup score.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub chunk: Chunk,
    pub score: f32,

    /// Label shown next to the source in the prompt (the policy name for
    /// comparisons)
    pub group: Option<String>,
}

impl Evidence {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score,
            group: None,
        }
    }

    pub fn grouped(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// How the synthesizer turns function evidence into an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisTask {
    /// Quote the evidence as is, without the model
    Verbatim,
    /// Ask the model for a bulleted condensation
    Summarize { policy_name: String },
    /// Ask the model for similarities and differences
    Compare { policy_a: String, policy_b: String },
}

/// Output of a function handler.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResult {
    pub function: IntentKind,
    pub chunks: Vec<Evidence>,
    pub task: SynthesisTask,
}

/// A parameter a function accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

impl ParameterSpec {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            required: false,
            description,
        }
    }
}

/// Public description of a registered function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionDescription {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

/// A deterministic handler for one intent.
pub trait FunctionHandler: Send + Sync {
    /// Intent this handler serves.
    fn kind(&self) -> IntentKind;

    fn description(&self) -> &'static str;

    fn parameters(&self) -> &'static [ParameterSpec];

    /// Look up the evidence for a routed question.
    ///
    /// Returns `NoMatch` when the store holds nothing that qualifies.
    fn handle(
        &self,
        params: &Parameters,
        question: &str,
        store: &dyn ChunkStore,
    ) -> AppResult<StructuredResult>;
}

/// The closed set of structured functions, keyed by intent.
pub struct FunctionRegistry {
    handlers: BTreeMap<IntentKind, Box<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    /// Registry with the fee, calendar, summary and comparison functions.
    pub fn standard(config: &EngineConfig) -> Self {
        let limit = config.retrieval.top_k;
        let categories = &config.categories;

        let handlers: Vec<Box<dyn FunctionHandler>> = vec![
            Box::new(FeeLookup::new(categories.fees.clone(), limit)),
            Box::new(CalendarLookup::new(categories.calendar.clone(), limit)),
            Box::new(PolicySummary::new(categories.policies.clone())),
            Box::new(PolicyComparison::new(categories.policies.clone(), limit)),
        ];

        Self {
            handlers: handlers.into_iter().map(|h| (h.kind(), h)).collect(),
        }
    }

    pub fn get(&self, kind: IntentKind) -> Option<&dyn FunctionHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    /// All functions, ordered by intent.
    pub fn describe(&self) -> Vec<FunctionDescription> {
        self.handlers
            .values()
            .map(|h| FunctionDescription {
                name: h.kind().to_string(),
                description: h.description().to_string(),
                parameters: h.parameters().to_vec(),
            })
            .collect()
    }
}

pub(crate) fn no_match(function: IntentKind, detail: impl Into<String>) -> AppError {
    AppError::NoMatch {
        function: function.to_string(),
        detail: detail.into(),
    }
}

/// Keyword lookup inside one category.
///
/// With a `required` term only chunks mentioning it qualify. Without one,
/// only chunks sharing terms with the question qualify, so a question the
/// category does not cover comes back empty.
/// Qualifying chunks are ranked by keyword score against the question;
/// ties keep document order.
pub(crate) fn category_lookup(
    store: &dyn ChunkStore,
    category: &str,
    required: Option<&str>,
    question: &str,
    limit: usize,
) -> AppResult<Vec<Evidence>> {
    let chunks = store.chunks(Some(&ChunkFilter::category(category)))?;
    let terms = query_terms(question);

    let scored: Vec<Evidence> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let counts = term_counts(&chunk.text);
            if let Some(term) = required {
                if !mentions(&counts, term) {
                    return None;
                }
            }
            let score = keyword_score(&counts, &terms);
            Some(Evidence::new(chunk, score))
        })
        .collect();

    let mut selected: Vec<Evidence> = if required.is_some() {
        scored
    } else {
        scored.into_iter().filter(|e| e.score > 0.0).collect()
    };

    selected.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    selected.truncate(limit);
    Ok(selected)
}

/// Keep only the evidence satisfying `prefer`, unless none does.
pub(crate) fn narrow(evidence: Vec<Evidence>, prefer: impl Fn(&Chunk) -> bool) -> Vec<Evidence> {
    if evidence.iter().any(|e| prefer(&e.chunk)) {
        evidence.into_iter().filter(|e| prefer(&e.chunk)).collect()
    } else {
        evidence
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::store;
    use super::*;

    #[test]
    fn test_registry_is_closed_over_function_intents() {
        let registry = FunctionRegistry::standard(&EngineConfig::default());
        assert!(registry.get(IntentKind::FeeLookup).is_some());
        assert!(registry.get(IntentKind::CalendarLookup).is_some());
        assert!(registry.get(IntentKind::PolicySummary).is_some());
        assert!(registry.get(IntentKind::PolicyComparison).is_some());
        assert!(registry.get(IntentKind::PolicySearch).is_none());
        assert!(registry.get(IntentKind::GeneralRag).is_none());
    }

    #[test]
    fn test_describe_lists_parameters() {
        let registry = FunctionRegistry::standard(&EngineConfig::default());
        let described = registry.describe();
        assert_eq!(described.len(), 4);

        let comparison = described
            .iter()
            .find(|d| d.name == "policy_comparison")
            .unwrap();
        assert!(comparison.parameters.iter().all(|p| p.required));

        let fee = described.iter().find(|d| d.name == "fee_lookup").unwrap();
        assert!(fee.parameters.iter().all(|p| !p.required));
    }

    #[test]
    fn test_lookup_without_shared_terms_is_empty() {
        let store = store(&[
            ("fees.pdf", "fees", "MBA tuition fee is Rs 250000 per semester"),
            ("fees.pdf", "fees", "Mess charges Rs 30000"),
        ]);
        let found = category_lookup(&store, "fees", None, "What is the library fine?", 2).unwrap();
        assert!(found.is_empty());

        let found = category_lookup(&store, "fees", None, "what are the mess charges", 2).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].chunk.text.starts_with("Mess"));
    }

    #[test]
    fn test_lookup_with_required_term() {
        let store = store(&[
            ("fees.pdf", "fees", "M.Tech tuition Rs 60000"),
            ("fees.pdf", "fees", "B.Tech tuition Rs 75000"),
        ]);
        let found = category_lookup(&store, "fees", Some("btech"), "tuition", 5).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].chunk.text.contains("75000"));

        let none = category_lookup(&store, "fees", Some("phd"), "tuition", 5).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_narrow_keeps_all_when_nothing_preferred() {
        let store = store(&[("a.pdf", "fees", "fee one"), ("a.pdf", "fees", "fee two")]);
        let all = category_lookup(&store, "fees", None, "fee", 5).unwrap();
        assert_eq!(narrow(all.clone(), |c| c.text.contains("two")).len(), 1);
        assert_eq!(narrow(all, |c| c.text.contains("three")).len(), 2);
    }
}
