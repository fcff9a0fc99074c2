//! Adapter dispatch layer.
//!
//! One [`Adapter`] variant per [`EvaluationSource`]. The variant is chosen once
//! per dispatch in [`AdapterRegistry::adapter_for`]; nothing downstream
//! branches on the source again. Every variant answers with the same
//! [`EvaluationOutcome`] shape.
//!
//! # Module layout
//!
//! - [`vendor`]: vendor-compatible metric catalogue
//! - [`internal`]: built-in heuristic checks
//! - [`custom`]: organization scorers registered at startup
//! - [`llm_judge`]: user-defined judge prompts
//! - [`error`]: `AdapterError`, `AdapterFailure`

pub mod custom;
pub mod error;
pub mod internal;
pub mod llm_judge;
pub mod vendor;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracegrade_store::{EvaluationDefinition, EvaluationSource, TraceRecord};
use tracing::debug;

use crate::config::ExecutorConfig;
use crate::domain::EvaluationOutcome;
use crate::gateway::ModelGateway;
use crate::parse::text_of;

pub use custom::{CustomAdapter, CustomScorer, FnScorer};
pub use error::{AdapterError, AdapterFailure};
pub use internal::InternalAdapter;
pub use llm_judge::JudgeAdapter;
pub use vendor::VendorAdapter;

/// What one dispatch produced: an outcome, or a failure with the usage spent.
pub type DispatchOutcome = Result<EvaluationOutcome, AdapterFailure>;

/// Everything an adapter may read for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub definition: &'a EvaluationDefinition,
    pub trace: &'a TraceRecord,
    pub model_override: Option<&'a str>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(definition: &'a EvaluationDefinition, trace: &'a TraceRecord) -> Self {
        Self {
            definition,
            trace,
            model_override: None,
        }
    }

    pub fn with_model_override(mut self, model: Option<&'a str>) -> Self {
        self.model_override = model;
        self
    }

    pub fn config(&self) -> &'a serde_json::Value {
        &self.definition.config
    }

    pub fn config_str(&self, key: &str) -> Option<&'a str> {
        self.definition.config.get(key).and_then(|v| v.as_str())
    }

    pub fn input_text(&self) -> String {
        text_of(&self.trace.input)
    }

    pub fn output_text(&self) -> String {
        text_of(&self.trace.output)
    }

    /// Reference answer: the trace's own, else one pinned in the config.
    pub fn expected_text(&self) -> Option<String> {
        self.trace
            .expected
            .as_ref()
            .or_else(|| self.definition.config.get("expected"))
            .map(text_of)
    }

    /// Model used for LLM-graded evaluations: the request override wins, then
    /// the definition's own `model`, then the engine default.
    pub fn grading_model(&self, default_model: &str) -> String {
        self.model_override
            .or_else(|| self.config_str("model"))
            .unwrap_or(default_model)
            .to_string()
    }
}

/// Substitute `{{input}}`, `{{output}}`, `{{expected}}` and any extra
/// placeholders into a prompt template.
pub(crate) fn render_template(
    template: &str,
    ctx: &EvaluationContext<'_>,
    extra: &[(&str, &str)],
) -> String {
    let expected = ctx.expected_text().unwrap_or_default();
    let mut rendered = template
        .replace("{{input}}", &ctx.input_text())
        .replace("{{output}}", &ctx.output_text())
        .replace("{{expected}}", &expected);
    for (key, value) in extra {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

/// The execution strategy for one evaluation source.
pub enum Adapter<'r> {
    Vendor(VendorAdapter<'r>),
    Internal(InternalAdapter),
    Custom(CustomAdapter<'r>),
    Judge(JudgeAdapter<'r>),
}

impl<'r> Adapter<'r> {
    pub fn source(&self) -> EvaluationSource {
        match self {
            Adapter::Vendor(_) => EvaluationSource::Vendor,
            Adapter::Internal(_) => EvaluationSource::Internal,
            Adapter::Custom(_) => EvaluationSource::Custom,
            Adapter::Judge(_) => EvaluationSource::LlmJudge,
        }
    }

    pub async fn execute(&self, ctx: &EvaluationContext<'_>) -> DispatchOutcome {
        match self {
            Adapter::Vendor(a) => a.execute(ctx).await,
            Adapter::Internal(a) => a.execute(ctx),
            Adapter::Custom(a) => a.execute(ctx).await,
            Adapter::Judge(a) => a.execute(ctx).await,
        }
    }
}

/// Explicit adapter registry, built once at startup and shared by the
/// executor and the comparison orchestrator.
pub struct AdapterRegistry {
    gateway: Arc<dyn ModelGateway>,
    custom: HashMap<String, Arc<dyn CustomScorer>>,
    default_model: String,
    call_timeout: Duration,
}

impl AdapterRegistry {
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &ExecutorConfig) -> Self {
        Self {
            gateway,
            custom: HashMap::new(),
            default_model: config.default_model.clone(),
            call_timeout: config.call_timeout(),
        }
    }

    /// Register a custom scorer under `name`. Names are unique.
    pub fn register_custom(
        &mut self,
        name: impl Into<String>,
        scorer: Arc<dyn CustomScorer>,
    ) -> Result<(), AdapterError> {
        let name = name.into();
        if self.custom.contains_key(&name) {
            return Err(AdapterError::invalid_config(format!(
                "custom scorer {name} is already registered"
            )));
        }
        debug!(scorer = %name, "registered custom scorer");
        self.custom.insert(name, scorer);
        Ok(())
    }

    pub fn custom_scorers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn gateway(&self) -> &dyn ModelGateway {
        self.gateway.as_ref()
    }

    pub fn adapter_for(&self, source: EvaluationSource) -> Adapter<'_> {
        match source {
            EvaluationSource::Vendor => Adapter::Vendor(VendorAdapter::new(
                self.gateway.as_ref(),
                &self.default_model,
                self.call_timeout,
            )),
            EvaluationSource::Internal => Adapter::Internal(InternalAdapter),
            EvaluationSource::Custom => Adapter::Custom(CustomAdapter::new(&self.custom)),
            EvaluationSource::LlmJudge => Adapter::Judge(JudgeAdapter::new(
                self.gateway.as_ref(),
                &self.default_model,
                self.call_timeout,
            )),
        }
    }

    /// Run one evaluation. Never fails the caller: every error, including an
    /// elapsed deadline, comes back as an [`AdapterFailure`].
    ///
    /// Model-backed adapters bound each gateway call themselves, so a slow
    /// grader surfaces as a gateway timeout naming the model. Custom scorers
    /// get the same deadline around the whole call.
    pub async fn dispatch(&self, ctx: &EvaluationContext<'_>) -> DispatchOutcome {
        let started = Instant::now();
        let adapter = self.adapter_for(ctx.definition.source);

        let result = match &adapter {
            Adapter::Custom(_) => {
                match tokio::time::timeout(self.call_timeout, adapter.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(AdapterError::Timeout {
                        timeout_ms: self.call_timeout.as_millis() as u64,
                    }
                    .into()),
                }
            }
            _ => adapter.execute(ctx).await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut outcome) => {
                if let Some(score) = outcome.score {
                    if !(0.0..=1.0).contains(&score) {
                        return Err(AdapterFailure {
                            error: AdapterError::ScoreOutOfRange { score },
                            model: outcome.model,
                            tokens: outcome.tokens,
                            cost_usd: outcome.cost_usd,
                            duration_ms: elapsed_ms,
                        });
                    }
                }
                outcome.duration_ms = elapsed_ms;
                Ok(outcome)
            }
            Err(mut failure) => {
                failure.duration_ms = elapsed_ms;
                Err(failure)
            }
        }
    }
}
