//! Configuration for PromptLoop sessions and model endpoints.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! [target]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//!
//! [judge]
//! model = "gpt-4o"
//!
//! [optimizer]
//! max_rounds = 5
//! target_score = 90.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{PromptLoopError, Result, DEFAULT_EXECUTION_COUNT, DEFAULT_TEMPERATURE};

/// An OpenAI-compatible model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ModelEndpoint {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Stopping rules for the automatic loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Round budget; the session stops after this many recorded rounds.
    pub max_rounds: u32,
    /// Stop as soon as a round's average score reaches this value.
    pub target_score: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            target_score: 90.0,
        }
    }
}

/// Defaults applied to test cases built from CLI input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseDefaults {
    pub execution_count: u32,
    pub temperature: f32,
}

impl Default for CaseDefaults {
    fn default() -> Self {
        Self {
            execution_count: DEFAULT_EXECUTION_COUNT,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptLoopConfig {
    /// Model under test.
    pub target: ModelEndpoint,
    /// Judge model. Falls back to `target` when absent.
    pub judge: Option<ModelEndpoint>,
    pub optimizer: OptimizerConfig,
    pub defaults: CaseDefaults,
}

impl PromptLoopConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PromptLoopError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// The endpoint used for evaluation, clustering and rewriting.
    pub fn judge_endpoint(&self) -> &ModelEndpoint {
        self.judge.as_ref().unwrap_or(&self.target)
    }

    pub fn validate(&self) -> Result<()> {
        if self.optimizer.max_rounds == 0 {
            return Err(PromptLoopError::Config(
                "optimizer.max_rounds must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.optimizer.target_score) {
            return Err(PromptLoopError::Config(format!(
                "optimizer.target_score must be within 0..=100, got {}",
                self.optimizer.target_score
            )));
        }
        Ok(())
    }
}
