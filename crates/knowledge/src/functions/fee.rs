//! Fee structure lookup.

use super::{category_lookup, narrow, no_match, FunctionHandler, ParameterSpec, StructuredResult, SynthesisTask};
use crate::store::ChunkStore;
use crate::types::{IntentKind, Parameters};
use citewise_core::AppResult;
use regex::Regex;

const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional("program", "Program name, normalized (e.g. btech, mtech, phd)"),
    ParameterSpec::optional("semester", "Semester number"),
];

/// Quotes the fee fragments relevant to a program and semester.
#[derive(Debug, Clone)]
pub struct FeeLookup {
    category: String,
    limit: usize,
}

impl FeeLookup {
    pub fn new(category: impl Into<String>, limit: usize) -> Self {
        Self {
            category: category.into(),
            limit,
        }
    }
}

/// Matches "semester 3", "sem 3" and "3rd semester".
fn semester_pattern(semester: &str) -> Option<Regex> {
    let n = regex::escape(semester);
    Regex::new(&format!(
        r"(?i)\bsem(?:ester)?\s*{n}\b|\b{n}(?:st|nd|rd|th)?\s+sem(?:ester)?\b"
    ))
    .ok()
}

impl FunctionHandler for FeeLookup {
    fn kind(&self) -> IntentKind {
        IntentKind::FeeLookup
    }

    fn description(&self) -> &'static str {
        "Fee structure, due dates and fines for a program"
    }

    fn parameters(&self) -> &'static [ParameterSpec] {
        PARAMETERS
    }

    fn handle(
        &self,
        params: &Parameters,
        question: &str,
        store: &dyn ChunkStore,
    ) -> AppResult<StructuredResult> {
        let program = params.get("program").map(String::as_str);
        let mut chunks = category_lookup(store, &self.category, program, question, self.limit)?;

        if let Some(pattern) = params.get("semester").and_then(|s| semester_pattern(s)) {
            chunks = narrow(chunks, |c| pattern.is_match(&c.text));
        }

        if chunks.is_empty() {
            let detail = match program {
                Some(p) => format!("no {} fee entries for program '{}'", self.category, p),
                None => format!("nothing in '{}' matches the question", self.category),
            };
            return Err(no_match(self.kind(), detail));
        }

        tracing::debug!(program = ?program, found = chunks.len(), "Fee lookup");
        Ok(StructuredResult {
            function: self.kind(),
            chunks,
            task: SynthesisTask::Verbatim,
        })
    }
}
