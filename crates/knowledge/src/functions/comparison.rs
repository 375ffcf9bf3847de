//! Side-by-side comparison of two policies.

use super::summary::policy_chunks;
use super::{no_match, Evidence, FunctionHandler, ParameterSpec, StructuredResult, SynthesisTask};
use crate::store::ChunkStore;
use crate::types::{IntentKind, Parameters};
use citewise_core::AppResult;
use std::collections::HashSet;

const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::required("policy_a", "First policy name"),
    ParameterSpec::required("policy_b", "Second policy name"),
];

#[derive(Debug, Clone)]
pub struct PolicyComparison {
    category: String,
    limit: usize,
}

impl PolicyComparison {
    pub fn new(category: impl Into<String>, limit: usize) -> Self {
        Self {
            category: category.into(),
            limit,
        }
    }
}

impl FunctionHandler for PolicyComparison {
    fn kind(&self) -> IntentKind {
        IntentKind::PolicyComparison
    }

    fn description(&self) -> &'static str {
        "Similarities and differences between two policies"
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
        let (Some(policy_a), Some(policy_b)) = (params.get("policy_a"), params.get("policy_b"))
        else {
            return Err(no_match(self.kind(), "two policy names are required"));
        };

        let side_a = policy_chunks(store, &self.category, policy_a)?;
        let side_b = policy_chunks(store, &self.category, policy_b)?;

        for (name, side) in [(policy_a, &side_a), (policy_b, &side_b)] {
            if side.is_empty() {
                return Err(no_match(
                    self.kind(),
                    format!("no {} documents mention '{}'", self.category, name),
                ));
            }
        }

        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        for (name, side) in [(policy_a, side_a), (policy_b, side_b)] {
            for chunk in side.into_iter().take(self.limit) {
                if seen.insert(chunk.id.clone()) {
                    chunks.push(Evidence::new(chunk, 1.0).grouped(name.clone()));
                }
            }
        }

        tracing::debug!(
            policy_a = %policy_a,
            policy_b = %policy_b,
            found = chunks.len(),
            "Policy comparison lookup"
        );
        Ok(StructuredResult {
            function: self.kind(),
            chunks,
            task: SynthesisTask::Compare {
                policy_a: policy_a.clone(),
                policy_b: policy_b.clone(),
            },
        })
    }
}
