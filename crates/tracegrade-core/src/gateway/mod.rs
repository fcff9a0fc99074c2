//! Model-invocation gateway.
//!
//! Every model call the engine makes (LLM-graded vendor metrics, judge-prompt
//! evaluations, stage judging and synthesis) goes through [`ModelGateway`].
//! Adapters and the comparison judge use the same contract.

pub mod fakes;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracegrade_store::TokenUsage;

pub use http::HttpGateway;

/// Sampling parameters for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Optional system message sent ahead of the prompt.
    pub system: Option<String>,
}

impl InvokeParams {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A finished model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub model: String,
    pub text: String,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// Errors produced by a gateway call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider response: {message}")]
    InvalidResponse { message: String },

    #[error("call to {model} timed out after {timeout_ms}ms")]
    Timeout { model: String, timeout_ms: u64 },

    #[error("api key environment variable {env} is not set")]
    MissingApiKey { env: String },

    #[error("{0}")]
    Other(String),
}

/// Invokes a model with a prompt.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<Completion, GatewayError>;
}

/// Invoke with a per-call deadline; an elapsed deadline is a
/// [`GatewayError::Timeout`] like any other call failure.
pub async fn invoke_with_timeout(
    gateway: &dyn ModelGateway,
    model: &str,
    prompt: &str,
    params: &InvokeParams,
    timeout: Duration,
) -> Result<Completion, GatewayError> {
    match tokio::time::timeout(timeout, gateway.invoke(model, prompt, params)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            model: model.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{Reply, Rule, ScriptedGateway};
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_invoke_with_timeout_reports_timeout() {
        let gateway = ScriptedGateway::new()
            .rule(Rule::any().reply(Reply::text("late")).delay(Duration::from_secs(30)));

        let err = invoke_with_timeout(
            &gateway,
            "judge-model",
            "prompt",
            &InvokeParams::default(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout { timeout_ms: 100, .. }));
    }

    #[tokio::test]
    async fn test_invoke_with_timeout_passes_through() {
        let gateway = ScriptedGateway::new().rule(Rule::any().reply(Reply::text("ok")));
        let completion = invoke_with_timeout(
            &gateway,
            "m",
            "p",
            &InvokeParams::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(completion.text, "ok");
    }
}
