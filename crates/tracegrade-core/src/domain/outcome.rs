//! The normalized shape every adapter answers with.

use serde::{Deserialize, Serialize};
use tracegrade_store::{ContentDigest, TokenUsage};

/// What one evaluation produced, independent of which adapter ran it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub score: Option<f64>,
    pub passed: Option<bool>,
    pub category: Option<String>,
    pub reason: Option<String>,
    /// Model that graded the trace, for LLM-backed adapters.
    pub model: Option<String>,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
    /// What the evaluation was given (prompt text or scorer arguments).
    pub evaluation_input: serde_json::Value,
    /// Raw evaluation output (model text or scorer detail).
    pub evaluation_output: serde_json::Value,
    /// Digest of the prompt sent to the grading model.
    pub prompt_digest: Option<ContentDigest>,
}

impl EvaluationOutcome {
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }

    /// A boolean check, scored 1.0 on pass and 0.0 on fail.
    pub fn check(passed: bool) -> Self {
        Self {
            score: Some(if passed { 1.0 } else { 0.0 }),
            passed: Some(passed),
            ..Self::default()
        }
    }

    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = Some(passed);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.evaluation_input = input;
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.evaluation_output = output;
        self
    }
}
