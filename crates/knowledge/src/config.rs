//! Engine configuration: retrieval, grounding and synthesis tuning.
//!
//! Loaded from `.citewise/engine.yaml` when present; every field has a
//! default so a partial file only overrides what it names.

use citewise_core::config::{AppConfig, STATE_DIR};
use citewise_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Answer text returned whenever no authoritative source was found.
pub const FALLBACK_ANSWER: &str = "I couldn't find an authoritative answer in the available documents.";

const DEFAULT_DISCLAIMER: &str = "Note: parts of this answer could not be verified against the source documents. Please check the cited sources.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retrieval: RetrievalConfig,
    pub grounding: GroundingConfig,
    pub synthesis: SynthesisConfig,
    pub categories: CategoryConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of candidates handed to synthesis
    pub top_k: usize,

    /// Candidates fetched from each of semantic and keyword search
    pub candidate_pool: usize,

    /// Weight of the semantic score in the fused score
    pub alpha: f32,

    /// Minimum re-rank score a candidate needs to be kept
    pub min_relevance: f32,

    /// Extra keyword-query terms appended when a question mentions the key
    pub expansions: BTreeMap<String, String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let mut expansions = BTreeMap::new();
        expansions.insert("fee".to_string(), "fee structure fees payment".to_string());
        expansions.insert(
            "policy".to_string(),
            "policy policies regulation regulations".to_string(),
        );
        Self {
            top_k: 5,
            candidate_pool: 30,
            alpha: 0.7,
            min_relevance: 0.2,
            expansions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Share of a sentence's n-grams a chunk must contain to be cited
    pub citation_overlap_threshold: f32,

    /// Share of answer content that must be attributable to a source
    pub grounding_threshold: f32,

    /// Appended to answers that fail the grounding check
    pub disclaimer: String,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            citation_overlap_threshold: 0.5,
            grounding_threshold: 0.5,
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_context_tokens: usize,
    pub summary_max_tokens: usize,
    pub history_turns: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 2048,
            summary_max_tokens: 3000,
            history_turns: 3,
            temperature: 0.3,
            max_tokens: 1000,
            model_timeout_secs: 60,
        }
    }
}

/// Category names used by the structured functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub fees: String,
    pub calendar: String,
    pub policies: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            fees: "fees".to_string(),
            calendar: "calendar".to_string(),
            policies: "policies".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "mock" (trigram hashing, offline) or "ollama"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl EngineConfig {
    /// Path of the engine config inside a workspace.
    pub fn path(workspace: &Path) -> PathBuf {
        workspace.join(STATE_DIR).join("engine.yaml")
    }

    /// Load from the workspace, falling back to defaults when no file exists.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        let config_path = Self::path(workspace);

        if !config_path.exists() {
            tracing::debug!("No engine config at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read engine config at {:?}: {}", config_path, e))
        })?;

        let config: EngineConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse engine config at {:?}: {}", config_path, e))
        })?;

        config.validate()?;
        tracing::debug!("Loaded engine config from {:?}", config_path);
        Ok(config)
    }

    /// Load from the workspace and apply what the application config says
    /// about the engine: the provider timeout, and the embedding model
    /// declared in the embedding provider's block of `config.yaml`.
    pub fn for_app(app: &AppConfig) -> AppResult<Self> {
        let mut config = Self::load(&app.workspace)?;

        if let Some(timeout) = app.timeout_secs {
            config.synthesis.model_timeout_secs = timeout;
        }

        if let Some(model) = app
            .provider_config(&config.embedding.provider)
            .and_then(|p| p.embedding_model.as_ref())
        {
            tracing::debug!(model = %model, "Embedding model from provider config");
            config.embedding.model = model.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Write the config to the workspace.
    pub fn save(&self, workspace: &Path) -> AppResult<()> {
        let config_path = Self::path(workspace);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(&config_path, yaml).map_err(|e| {
            AppError::Config(format!("Failed to write engine config to {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Saved engine config to {:?}", config_path);
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        let r = &self.retrieval;
        if r.top_k == 0 {
            return Err(AppError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if r.candidate_pool < r.top_k {
            return Err(AppError::Config(format!(
                "retrieval.candidate_pool ({}) must not be smaller than top_k ({})",
                r.candidate_pool, r.top_k
            )));
        }
        check_unit("retrieval.alpha", r.alpha)?;
        check_unit("retrieval.min_relevance", r.min_relevance)?;

        let g = &self.grounding;
        check_unit("grounding.citation_overlap_threshold", g.citation_overlap_threshold)?;
        check_unit("grounding.grounding_threshold", g.grounding_threshold)?;

        let s = &self.synthesis;
        if s.max_context_tokens == 0 || s.summary_max_tokens == 0 {
            return Err(AppError::Config("Context token budgets must be positive".to_string()));
        }
        if s.model_timeout_secs == 0 {
            return Err(AppError::Config(
                "synthesis.model_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&s.temperature) {
            return Err(AppError::Config(format!(
                "synthesis.temperature must be within [0, 2], got {}",
                s.temperature
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config("embedding.dimensions must be positive".to_string()));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> AppResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citewise_core::config::{LlmConfig, ProviderConfig};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn ollama_block(embedding_model: Option<&str>) -> LlmConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                model: "llama3.2".to_string(),
                endpoint: None,
                embedding_model: embedding_model.map(str::to_string),
                timeout: None,
            },
        );
        LlmConfig {
            active_provider: "ollama".to_string(),
            providers,
        }
    }

    #[test]
    fn test_for_app_takes_embedding_model_from_provider_block() {
        let dir = TempDir::new().unwrap();
        let mut engine = EngineConfig::default();
        engine.embedding.provider = "ollama".to_string();
        engine.save(dir.path()).unwrap();

        let app = AppConfig {
            workspace: dir.path().to_path_buf(),
            timeout_secs: Some(9),
            llm: Some(ollama_block(Some("mxbai-embed-large"))),
            ..AppConfig::default()
        };
        let config = EngineConfig::for_app(&app).unwrap();
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.synthesis.model_timeout_secs, 9);

        let app = AppConfig {
            llm: Some(ollama_block(None)),
            ..app
        };
        let config = EngineConfig::for_app(&app).unwrap();
        assert_eq!(config.embedding.model, EmbeddingConfig::default().model);
    }

    #[test]
    fn test_for_app_ignores_other_providers_embedding_model() {
        let dir = TempDir::new().unwrap();
        let app = AppConfig {
            workspace: dir.path().to_path_buf(),
            llm: Some(ollama_block(Some("mxbai-embed-large"))),
            ..AppConfig::default()
        };
        // Default embedding provider is "mock".
        let config = EngineConfig::for_app(&app).unwrap();
        assert_eq!(config.embedding.model, "trigram-v1");
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.candidate_pool, 30);
        assert!((config.retrieval.alpha - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.synthesis.max_context_tokens, 2048);
        assert_eq!(config.embedding.dimensions, 384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::load(temp.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_named_fields() {
        let temp = TempDir::new().unwrap();
        let path = EngineConfig::path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "retrieval:\n  top_k: 3\ncategories:\n  fees: fee-structure\n",
        )
        .unwrap();

        let config = EngineConfig::load(temp.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.candidate_pool, 30);
        assert_eq!(config.categories.fees, "fee-structure");
        assert_eq!(config.categories.calendar, "calendar");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.grounding.grounding_threshold = 0.6;
        config.save(temp.path()).unwrap();

        let loaded = EngineConfig::load(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = EngineConfig::default();
        config.retrieval.alpha = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retrieval.candidate_pool = 2;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.synthesis.model_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
