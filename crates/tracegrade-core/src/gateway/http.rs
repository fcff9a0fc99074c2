//! OpenAI-compatible chat completions gateway.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use tracegrade_store::TokenUsage;
use tracing::debug;

use super::{Completion, GatewayError, InvokeParams, ModelGateway};
use crate::config::GatewayConfig;

pub struct HttpGateway {
    client: Client,
    url: String,
    headers: HeaderMap,
    config: GatewayConfig,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway").field("url", &self.url).finish()
    }
}

impl HttpGateway {
    /// Build a gateway, reading the api key from `config.api_key_env`.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| GatewayError::MissingApiKey {
                env: config.api_key_env.clone(),
            })?;
        Self::with_api_key(config, &api_key)
    }

    pub fn with_api_key(config: GatewayConfig, api_key: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let headers = auth_headers(api_key, &config)?;
        let url = format!("{}{}", config.api_base.trim_end_matches('/'), config.path);
        Ok(Self {
            client,
            url,
            headers,
            config,
        })
    }

    fn request_body(model: &str, prompt: &str, params: &InvokeParams) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &params.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if let Some(t) = params.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(p) = params.top_p {
            body["top_p"] = serde_json::json!(p);
        }
        if let Some(m) = params.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        body
    }

    fn cost_for(&self, model: &str, json: &Value, tokens: &TokenUsage) -> f64 {
        // Some routers report the billed cost directly.
        if let Some(cost) = json
            .get("usage")
            .and_then(|u| u.get("cost"))
            .and_then(Value::as_f64)
        {
            return cost;
        }
        self.config
            .pricing
            .get(model)
            .map(|p| p.cost(tokens.prompt_tokens, tokens.completion_tokens))
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<Completion, GatewayError> {
        let started = Instant::now();
        let body = Self::request_body(model, prompt, params);

        let res = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = res.json().await?;
        let text = parse_completion_text(&json)?;
        let tokens = parse_usage(&json);
        let cost_usd = self.cost_for(model, &json, &tokens);
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            model = %model,
            total_tokens = tokens.total_tokens,
            cost_usd,
            duration_ms,
            "model call completed"
        );

        Ok(Completion {
            model: model.to_string(),
            text,
            tokens,
            cost_usd,
            duration_ms,
        })
    }
}

fn auth_headers(api_key: &str, config: &GatewayConfig) -> Result<HeaderMap, GatewayError> {
    let invalid = |message: String| GatewayError::InvalidResponse { message };

    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| invalid(format!("api key is not a valid header value: {e}")))?;
    headers.insert(AUTHORIZATION, bearer);
    for (key, value) in &config.default_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| invalid(format!("invalid header name {key}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid(format!("invalid header value for {key}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn parse_completion_text(json: &Value) -> Result<String, GatewayError> {
    json.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidResponse {
            message: "response is missing choices[0].message.content".to_string(),
        })
}

fn parse_usage(json: &Value) -> TokenUsage {
    let usage = json.get("usage");
    let field = |name: &str| {
        usage
            .and_then(|u| u.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let tokens = TokenUsage::new(field("prompt_tokens"), field("completion_tokens"));
    match field("total_tokens") {
        0 => tokens,
        total => TokenUsage {
            total_tokens: total,
            ..tokens
        },
    }
}
