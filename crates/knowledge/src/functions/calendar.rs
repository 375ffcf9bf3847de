//! Academic calendar lookup.

use super::{category_lookup, narrow, no_match, FunctionHandler, ParameterSpec, StructuredResult, SynthesisTask};
use crate::store::ChunkStore;
use crate::types::{IntentKind, Parameters};
use citewise_core::AppResult;

const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "event",
        "Event type (e.g. registration, examination, holiday, drop)",
    ),
    ParameterSpec::optional("year", "Year or academic year (e.g. 2024 or 2024-25)"),
];

/// Quotes the calendar entries for an event.
#[derive(Debug, Clone)]
pub struct CalendarLookup {
    category: String,
    limit: usize,
}

impl CalendarLookup {
    pub fn new(category: impl Into<String>, limit: usize) -> Self {
        Self {
            category: category.into(),
            limit,
        }
    }
}

impl FunctionHandler for CalendarLookup {
    fn kind(&self) -> IntentKind {
        IntentKind::CalendarLookup
    }

    fn description(&self) -> &'static str {
        "Dates and deadlines from the academic calendar"
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
        let event = params.get("event").map(String::as_str);
        let mut chunks = category_lookup(store, &self.category, event, question, self.limit)?;

        if let Some(year) = params.get("year") {
            let start = year.get(..4).unwrap_or(year).to_string();
            chunks = narrow(chunks, |c| c.text.contains(&start));
        }

        if chunks.is_empty() {
            let detail = match event {
                Some(e) => format!("no {} entries for '{}'", self.category, e),
                None => format!("nothing in '{}' matches the question", self.category),
            };
            return Err(no_match(self.kind(), detail));
        }

        tracing::debug!(event = ?event, found = chunks.len(), "Calendar lookup");
        Ok(StructuredResult {
            function: self.kind(),
            chunks,
            task: SynthesisTask::Verbatim,
        })
    }
}
