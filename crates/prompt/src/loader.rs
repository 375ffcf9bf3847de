//! Prompt loader for built-in and workspace prompt definitions.
//!
//! A workspace may override any built-in prompt by placing
//! `<id>.yaml` (or `<id>.yml`) in `.citewise/prompts/`.

use crate::builtin::{builtin_prompt, BUILTIN_IDS, GROUNDED_ANSWER, POLICY_COMPARISON, POLICY_SUMMARY};
use crate::types::{PromptDefinition, PromptSource};
use citewise_core::config::STATE_DIR;
use citewise_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

fn override_file(workspace_path: &Path, prompt_id: &str) -> Option<PathBuf> {
    let dir = prompts_dir(workspace_path);
    ["yaml", "yml"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", prompt_id, ext)))
        .find(|p| p.is_file())
}

/// Load a prompt definition by ID.
///
/// Workspace overrides win over built-in prompts.
///
/// # Example
/// ```no_run
/// use citewise_prompt::{load_prompt, GROUNDED_ANSWER};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (prompt, _) = load_prompt(Path::new("."), GROUNDED_ANSWER)?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<(PromptDefinition, PromptSource)> {
    if let Some(prompt_file) = override_file(workspace_path, prompt_id) {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);
        let definition = read_prompt_file(&prompt_file)?;

        if definition.id != prompt_id {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} declares id '{}', expected '{}'",
                prompt_file, definition.id, prompt_id
            )));
        }

        tracing::info!("Using workspace prompt: {} ({})", definition.id, definition.title);
        return Ok((definition, PromptSource::Workspace));
    }

    builtin_prompt(prompt_id)
        .map(|def| (def, PromptSource::Builtin))
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
}

fn read_prompt_file(prompt_file: &Path) -> AppResult<PromptDefinition> {
    let contents = std::fs::read_to_string(prompt_file).map_err(|e| {
        AppError::Prompt(format!("Failed to read prompt file {:?}: {}", prompt_file, e))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {:?}: {}", prompt_file, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// List all available prompt IDs: built-ins plus workspace files, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_IDS.iter().map(|id| id.to_string()).collect();
    let dir = prompts_dir(workspace_path);

    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("yaml") | Some("yml")
            );
            if path.is_file() && is_yaml {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompt_ids.push(stem.to_string());
                }
            }
        }
    }

    prompt_ids.sort();
    prompt_ids.dedup();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt("Prompt template cannot be empty".to_string()));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

/// The three prompts the answer synthesizer needs, resolved once.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub answer: PromptDefinition,
    pub summary: PromptDefinition,
    pub comparison: PromptDefinition,
}

impl PromptSet {
    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        let get = |id: &str| {
            builtin_prompt(id).ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))
        };
        Ok(Self {
            answer: get(GROUNDED_ANSWER)?,
            summary: get(POLICY_SUMMARY)?,
            comparison: get(POLICY_COMPARISON)?,
        })
    }

    /// Built-in prompts with workspace overrides applied.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        Ok(Self {
            answer: load_prompt(workspace_path, GROUNDED_ANSWER)?.0,
            summary: load_prompt(workspace_path, POLICY_SUMMARY)?.0,
            comparison: load_prompt(workspace_path, POLICY_COMPARISON)?.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, body: &str) {
        let prompts = dir.join(".citewise/prompts");
        fs::create_dir_all(&prompts).unwrap();
        fs::write(prompts.join(format!("{}.yaml", id)), body).unwrap();
    }

    fn override_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Registrar answer"
apiVersion: "1.0"
behavior:
  tone: formal
  style: concise
template: "Q: {{{{question}}}}"
output:
  format: text
"#,
            id
        )
    }

    #[test]
    fn test_builtin_used_without_override() {
        let temp_dir = TempDir::new().unwrap();
        let (prompt, source) = load_prompt(temp_dir.path(), GROUNDED_ANSWER).unwrap();
        assert_eq!(prompt.id, GROUNDED_ANSWER);
        assert_eq!(source, PromptSource::Builtin);
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), GROUNDED_ANSWER, &override_yaml(GROUNDED_ANSWER));

        let (prompt, source) = load_prompt(temp_dir.path(), GROUNDED_ANSWER).unwrap();
        assert_eq!(prompt.title, "Registrar answer");
        assert_eq!(source, PromptSource::Workspace);

        let set = PromptSet::load(temp_dir.path()).unwrap();
        assert_eq!(set.answer.template, "Q: {{question}}");
        assert_eq!(set.summary.id, POLICY_SUMMARY);
    }

    #[test]
    fn test_override_with_wrong_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), GROUNDED_ANSWER, &override_yaml("something.else"));
        assert!(load_prompt(temp_dir.path(), GROUNDED_ANSWER).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), POLICY_SUMMARY, "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), POLICY_SUMMARY).is_err());
    }

    #[test]
    fn test_unknown_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "custom.notice", &override_yaml("custom.notice"));
        write_override(temp_dir.path(), GROUNDED_ANSWER, &override_yaml(GROUNDED_ANSWER));

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts.contains(&"custom.notice".to_string()));
    }
}
