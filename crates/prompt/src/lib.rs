//! Prompt system for Citewise.
//!
//! This crate provides structured prompt management with:
//! - Built-in grounded answer, policy summary and policy comparison prompts
//! - YAML overrides in `.citewise/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::{builtin_prompt, GROUNDED_ANSWER, POLICY_COMPARISON, POLICY_SUMMARY};
pub use loader::{list_prompts, load_prompt, PromptSet};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptOutputSpec,
    PromptSource,
};
