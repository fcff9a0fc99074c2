//! Scripted gateway for tests and offline runs.
//!
//! Rules are checked in insertion order; the first rule whose matcher accepts
//! the call decides the reply. Every call is recorded so tests can assert on
//! what the engine actually sent.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracegrade_store::TokenUsage;

use super::{Completion, GatewayError, InvokeParams, ModelGateway};

/// Canned reply for a matched call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text {
        text: String,
        tokens: TokenUsage,
        cost_usd: f64,
    },
    Fail(String),
}

impl Reply {
    /// Text reply with a small default usage.
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text {
            text: text.into(),
            tokens: TokenUsage::new(120, 40),
            cost_usd: 0.0002,
        }
    }

    pub fn text_with_usage(text: impl Into<String>, tokens: TokenUsage, cost_usd: f64) -> Self {
        Reply::Text {
            text: text.into(),
            tokens,
            cost_usd,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Reply::Fail(message.into())
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Model(String),
    PromptContains(String),
}

/// One scripted behavior.
#[derive(Debug, Clone)]
pub struct Rule {
    matcher: Matcher,
    reply: Reply,
    delay: Duration,
}

impl Rule {
    pub fn any() -> Self {
        Self::with_matcher(Matcher::Any)
    }

    pub fn model(model: impl Into<String>) -> Self {
        Self::with_matcher(Matcher::Model(model.into()))
    }

    pub fn prompt_contains(needle: impl Into<String>) -> Self {
        Self::with_matcher(Matcher::PromptContains(needle.into()))
    }

    fn with_matcher(matcher: Matcher) -> Self {
        Self {
            matcher,
            reply: Reply::fail("scripted rule has no reply"),
            delay: Duration::ZERO,
        }
    }

    pub fn reply(mut self, reply: Reply) -> Self {
        self.reply = reply;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn matches(&self, model: &str, prompt: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Model(m) => m == model,
            Matcher::PromptContains(needle) => prompt.contains(needle.as_str()),
        }
    }
}

/// A call the gateway received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    pub params: InvokeParams,
}

#[derive(Debug, Default)]
pub struct ScriptedGateway {
    rules: Vec<Rule>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<Completion, GatewayError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            params: params.clone(),
        });

        let rule = self
            .rules
            .iter()
            .find(|r| r.matches(model, prompt))
            .cloned()
            .ok_or_else(|| GatewayError::Other(format!("no scripted reply for model {model}")))?;

        if !rule.delay.is_zero() {
            tokio::time::sleep(rule.delay).await;
        }

        match rule.reply {
            Reply::Text {
                text,
                tokens,
                cost_usd,
            } => Ok(Completion {
                model: model.to_string(),
                text,
                tokens,
                cost_usd,
                duration_ms: rule.delay.as_millis() as u64,
            }),
            Reply::Fail(message) => Err(GatewayError::Other(message)),
        }
    }
}
