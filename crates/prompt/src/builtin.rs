//! Prompts shipped with the binary.
//!
//! Every prompt presents its context as numbered source blocks:
//!
//! ```text
//! [1] academic-calendar.pdf | Page 2
//! Last day to drop a course: July 15
//! ```
//!
//! The number is the marker the model must cite.

use crate::types::{PromptBehavior, PromptDefinition, PromptOutputSpec};

/// Grounded question answering over retrieved sources.
pub const GROUNDED_ANSWER: &str = "citewise.answer.grounded";

/// Bulleted condensation of one policy.
pub const POLICY_SUMMARY: &str = "citewise.policy.summary";

/// Side-by-side comparison of two policies.
pub const POLICY_COMPARISON: &str = "citewise.policy.compare";

/// Identifiers of all built-in prompts.
pub const BUILTIN_IDS: [&str; 3] = [GROUNDED_ANSWER, POLICY_SUMMARY, POLICY_COMPARISON];

const GROUNDED_SYSTEM: &str = "You answer questions using only the numbered sources you are given. \
Cite every statement with the marker of the source it comes from, for example [1] or [2][3]. \
Do not use outside knowledge. If a statement cannot be supported by the sources, mark it with (unsupported). \
If the sources do not contain the answer, reply exactly: \
I couldn't find an authoritative answer in the available documents.";

const SOURCES_BLOCK: &str = "{{#each sources}}
[{{rank}}] {{source}}{{#if section}} | {{section}}{{/if}}{{#if policy}} (policy: {{policy}}){{/if}}
{{text}}

{{/each}}";

const HISTORY_BLOCK: &str = "{{#if history}}
Conversation so far:
{{#each history}}
Q: {{question}}
A: {{answer}}
{{/each}}

{{/if}}";

fn definition(id: &str, title: &str, style: &str, system: &str, template: String) -> PromptDefinition {
    PromptDefinition {
        id: id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        created_by: "citewise".to_string(),
        behavior: PromptBehavior {
            tone: "neutral".to_string(),
            style: style.to_string(),
        },
        system: Some(system.to_string()),
        template,
        output: PromptOutputSpec {
            format: "text".to_string(),
        },
    }
}

/// Look up a built-in prompt by id.
pub fn builtin_prompt(id: &str) -> Option<PromptDefinition> {
    match id {
        GROUNDED_ANSWER => Some(definition(
            GROUNDED_ANSWER,
            "Grounded answer",
            "concise",
            GROUNDED_SYSTEM,
            format!(
                "Sources:\n\n{}{}Question: {{{{question}}}}\n\nAnswer using only the sources above and cite them with [n] markers.",
                SOURCES_BLOCK, HISTORY_BLOCK
            ),
        )),
        POLICY_SUMMARY => Some(definition(
            POLICY_SUMMARY,
            "Policy summary",
            "bulleted",
            GROUNDED_SYSTEM,
            format!(
                "Sources for the {{{{policy_name}}}} policy:\n\n{}Summarize the {{{{policy_name}}}} policy as short bullet points. \
Keep every rule, deadline and amount that appears in the sources and cite each bullet with its [n] marker.\n\nRequest: {{{{question}}}}",
                SOURCES_BLOCK
            ),
        )),
        POLICY_COMPARISON => Some(definition(
            POLICY_COMPARISON,
            "Policy comparison",
            "structured",
            GROUNDED_SYSTEM,
            format!(
                "Sources for {{{{policy_a}}}} and {{{{policy_b}}}}:\n\n{}Compare the {{{{policy_a}}}} policy with the {{{{policy_b}}}} policy. \
List the similarities first, then the differences. Cite every point with its [n] marker.\n\nRequest: {{{{question}}}}",
                SOURCES_BLOCK
            ),
        )),
        _ => None,
    }
}
