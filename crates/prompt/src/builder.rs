//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use citewise_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde::Serialize;

/// Build a prompt from a definition and template variables.
///
/// `variables` must serialize to a JSON object; its fields are available to
/// both the system and the user template.
///
/// # Example
/// ```no_run
/// use citewise_prompt::{build_prompt, PromptDefinition};
/// use serde_json::json;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let vars = json!({ "question": "When is the fee due?", "sources": [] });
/// let built = build_prompt(&def, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt<T: Serialize>(
    definition: &PromptDefinition,
    variables: &T,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let data = serde_json::to_value(variables)?;
    let resolved: Vec<String> = match &data {
        serde_json::Value::Object(map) => map.keys().cloned().collect(),
        _ => {
            return Err(AppError::Prompt(format!(
                "Variables for prompt {} must be an object",
                definition.id
            )))
        }
    };

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &data))
        .transpose()?;
    let user = render_template(&definition.template, &data)?;

    Ok(BuiltPrompt::new(system, user, definition.id.clone(), resolved))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, data: &serde_json::Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{builtin_prompt, GROUNDED_ANSWER, POLICY_COMPARISON};
    use serde_json::json;

    #[test]
    fn test_render_simple_template() {
        let rendered = render_template("Question: {{question}}", &json!({"question": "Hi & bye"}));
        assert_eq!(rendered.unwrap(), "Question: Hi & bye");
    }

    #[test]
    fn test_render_template_missing_variable() {
        // Handlebars renders missing variables as empty string
        let result = render_template("Question: {{missing}}", &json!({}));
        assert_eq!(result.unwrap(), "Question: ");
    }

    #[test]
    fn test_grounded_answer_numbers_sources() {
        let def = builtin_prompt(GROUNDED_ANSWER).unwrap();
        let vars = json!({
            "question": "What's the last day to drop a course?",
            "sources": [
                {"rank": 1, "source": "calendar.pdf", "section": "Page 2", "text": "Last day to drop: July 15"},
                {"rank": 2, "source": "handbook.pdf", "section": null, "text": "Courses may be dropped online."}
            ],
            "history": []
        });

        let built = build_prompt(&def, &vars).unwrap();
        assert!(built.user.contains("[1] calendar.pdf | Page 2\nLast day to drop: July 15"));
        assert!(built.user.contains("[2] handbook.pdf\nCourses may be dropped online."));
        assert!(built.user.contains("Question: What's the last day to drop a course?"));
        assert!(!built.user.contains("Conversation so far"));
        assert!(built.system.unwrap().contains("I couldn't find an authoritative answer"));
        assert_eq!(built.metadata.source_prompt_id, GROUNDED_ANSWER);
    }

    #[test]
    fn test_history_rendered_when_present() {
        let def = builtin_prompt(GROUNDED_ANSWER).unwrap();
        let vars = json!({
            "question": "And for hostel?",
            "sources": [],
            "history": [{"question": "Library fine?", "answer": "Rs 10 per day [1]."}]
        });

        let built = build_prompt(&def, &vars).unwrap();
        assert!(built.user.contains("Q: Library fine?"));
        assert!(built.user.contains("A: Rs 10 per day [1]."));
    }

    #[test]
    fn test_comparison_names_both_policies() {
        let def = builtin_prompt(POLICY_COMPARISON).unwrap();
        let vars = json!({
            "question": "compare library and hostel policy",
            "policy_a": "library",
            "policy_b": "hostel",
            "sources": [
                {"rank": 1, "source": "library.pdf", "text": "Fine is Rs 10.", "policy": "library"}
            ]
        });

        let built = build_prompt(&def, &vars).unwrap();
        assert!(built.user.contains("library.pdf (policy: library)"));
        assert!(built.user.contains("Compare the library policy with the hostel policy"));
    }

    #[test]
    fn test_non_object_variables_rejected() {
        let def = builtin_prompt(GROUNDED_ANSWER).unwrap();
        assert!(build_prompt(&def, &vec!["a", "b"]).is_err());
    }
}
