//! Engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! yields a working configuration:
//!
//! ```toml
//! [executor]
//! max_concurrency = 4
//! call_timeout_ms = 60000
//!
//! [comparison]
//! tie_epsilon = 0.05
//! label_policy = "randomized"
//!
//! [gateway]
//! api_base = "https://api.openai.com"
//!
//! [gateway.pricing."gpt-4o-mini"]
//! prompt_per_1k = 0.00015
//! completion_per_1k = 0.0006
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    pub comparison: ComparisonConfig,
    pub gateway: GatewayConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.comparison.max_concurrent_stages == 0 {
            return Err(ConfigError::Invalid(
                "comparison.max_concurrent_stages must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.comparison.tie_epsilon) {
            return Err(ConfigError::Invalid(format!(
                "comparison.tie_epsilon must be in [0, 1), got {}",
                self.comparison.tie_epsilon
            )));
        }
        if self.executor.call_timeout_ms == 0 || self.comparison.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "call timeouts must be greater than zero".to_string(),
            ));
        }
        if self.executor.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "executor.default_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for evaluation batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum adapter calls in flight per batch.
    pub max_concurrency: usize,
    /// Deadline for one adapter invocation.
    pub call_timeout_ms: u64,
    /// Model used by LLM-graded evaluations that name none.
    pub default_model: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout_ms: 60_000,
            default_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// How judge-facing labels are assigned to the two analyses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// Coin flip per stage.
    #[default]
    Randomized,
    /// A is always shown first.
    Fixed,
}

/// Settings for blind comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Average-score gap below which a stage is a tie.
    pub tie_epsilon: f64,
    pub max_concurrent_stages: usize,
    pub label_policy: LabelPolicy,
    /// Seed for label randomization; entropy when unset.
    pub label_seed: Option<u64>,
    pub judge_temperature: f32,
    pub judge_max_tokens: u32,
    /// Deadline for one judge call.
    pub call_timeout_ms: u64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: 0.05,
            max_concurrent_stages: 3,
            label_policy: LabelPolicy::Randomized,
            label_seed: None,
            judge_temperature: 0.0,
            judge_max_tokens: 2048,
            call_timeout_ms: 120_000,
        }
    }
}

impl ComparisonConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Per-model token prices in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl ModelPricing {
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.prompt_per_1k
            + (completion_tokens as f64 / 1000.0) * self.completion_per_1k
    }
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_base: String,
    pub path: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub timeout_ms: u64,
    pub default_headers: BTreeMap<String, String>,
    pub pricing: BTreeMap<String, ModelPricing>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            path: "/v1/chat/completions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 120_000,
            default_headers: BTreeMap::new(),
            pricing: BTreeMap::new(),
        }
    }
}
