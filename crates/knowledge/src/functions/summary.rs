//! Policy summary: every fragment of one policy, in document order.

use super::{no_match, Evidence, FunctionHandler, ParameterSpec, StructuredResult, SynthesisTask};
use crate::store::ChunkStore;
use crate::text::{mentions, term_counts, tokenize};
use crate::types::{Chunk, ChunkFilter, IntentKind, Parameters};
use citewise_core::AppResult;

const PARAMETERS: &[ParameterSpec] = &[ParameterSpec::required(
    "policy_name",
    "Name of the policy (e.g. library, hostel, attendance)",
)];

#[derive(Debug, Clone)]
pub struct PolicySummary {
    category: String,
}

impl PolicySummary {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

/// Policy chunks mentioning every word of `name`, in document order.
pub(crate) fn policy_chunks(
    store: &dyn ChunkStore,
    category: &str,
    name: &str,
) -> AppResult<Vec<Chunk>> {
    let words = tokenize(name);
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = store.chunks(Some(&ChunkFilter::category(category)))?;
    Ok(chunks
        .into_iter()
        .filter(|chunk| {
            let counts = term_counts(&chunk.text);
            words.iter().all(|w| mentions(&counts, w))
        })
        .collect())
}

impl FunctionHandler for PolicySummary {
    fn kind(&self) -> IntentKind {
        IntentKind::PolicySummary
    }

    fn description(&self) -> &'static str {
        "Bulleted summary of one policy"
    }

    fn parameters(&self) -> &'static [ParameterSpec] {
        PARAMETERS
    }

    fn handle(
        &self,
        params: &Parameters,
        _question: &str,
        store: &dyn ChunkStore,
    ) -> AppResult<StructuredResult> {
        let policy_name = params
            .get("policy_name")
            .ok_or_else(|| no_match(self.kind(), "missing parameter 'policy_name'"))?;

        let chunks = policy_chunks(store, &self.category, policy_name)?;
        if chunks.is_empty() {
            return Err(no_match(
                self.kind(),
                format!("no {} documents mention '{}'", self.category, policy_name),
            ));
        }

        tracing::debug!(policy = %policy_name, found = chunks.len(), "Policy summary lookup");
        Ok(StructuredResult {
            function: self.kind(),
            chunks: chunks.into_iter().map(|c| Evidence::new(c, 1.0)).collect(),
            task: SynthesisTask::Summarize {
                policy_name: policy_name.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::store;
    use citewise_core::AppError;

    fn policy_store() -> crate::store::MemoryChunkStore {
        store(&[
            ("handbook.pdf", "policies", "Library: members may borrow 4 books"),
            ("handbook.pdf", "policies", "Hostel gates close at 10 PM"),
            ("handbook.pdf", "policies", "Library fine is Rs 10 per day"),
            ("handbook.pdf", "policies", "Anti-ragging committee handles complaints"),
            ("notice.pdf", "general", "Library closed on Sunday"),
        ])
    }

    fn params(name: &str) -> Parameters {
        Parameters::from([("policy_name".to_string(), name.to_string())])
    }

    #[test]
    fn test_collects_policy_in_document_order() {
        let handler = PolicySummary::new("policies");
        let result = handler
            .handle(&params("library"), "summarize the library policy", &policy_store())
            .unwrap();

        assert_eq!(result.chunks.len(), 2);
        assert!(result.chunks[0].chunk.sequence_index < result.chunks[1].chunk.sequence_index);
        assert!(result.chunks.iter().all(|e| e.chunk.category == "policies"));
        assert_eq!(
            result.task,
            SynthesisTask::Summarize {
                policy_name: "library".to_string()
            }
        );
    }

    #[test]
    fn test_multi_word_name() {
        let handler = PolicySummary::new("policies");
        let result = handler
            .handle(&params("anti ragging"), "tl;dr anti-ragging", &policy_store())
            .unwrap();
        assert_eq!(result.chunks.len(), 1);
    }

    #[test]
    fn test_unknown_policy_is_no_match() {
        let handler = PolicySummary::new("policies");
        let result = handler.handle(&params("parking"), "summarize parking", &policy_store());
        assert!(matches!(result, Err(AppError::NoMatch { .. })));
    }
}
