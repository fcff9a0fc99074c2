//! Error types for the adapter dispatch layer.

use tracegrade_store::TokenUsage;

use crate::gateway::GatewayError;

/// Why a single evaluation could not produce an outcome.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid adapter config: {message}")]
    InvalidConfig { message: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("unknown {source_kind} scorer: {name}")]
    UnknownScorer { source_kind: String, name: String },

    #[error("model call failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("evaluation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("unparsable grader response: {message}")]
    ResponseParse { message: String },

    #[error("score {score} is outside [0, 1]")]
    ScoreOutOfRange { score: f64 },

    #[error("custom scorer failed: {0}")]
    Custom(String),

    #[error("evaluation task aborted: {0}")]
    Aborted(String),
}

impl AdapterError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        AdapterError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        AdapterError::MissingField {
            field: field.into(),
        }
    }
}

/// A failed dispatch, carrying whatever usage was spent before it failed.
#[derive(Debug)]
pub struct AdapterFailure {
    pub error: AdapterError,
    pub model: Option<String>,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl AdapterFailure {
    pub fn with_usage(
        error: AdapterError,
        model: impl Into<String>,
        tokens: TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            error,
            model: Some(model.into()),
            tokens,
            cost_usd,
            duration_ms: 0,
        }
    }

    /// Attribute a failure that spent no usage to the grading model.
    pub fn for_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl From<AdapterError> for AdapterFailure {
    fn from(error: AdapterError) -> Self {
        Self {
            error,
            model: None,
            tokens: TokenUsage::default(),
            cost_usd: 0.0,
            duration_ms: 0,
        }
    }
}

impl From<GatewayError> for AdapterFailure {
    fn from(error: GatewayError) -> Self {
        AdapterError::from(error).into()
    }
}

impl std::fmt::Display for AdapterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}
