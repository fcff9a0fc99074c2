//! Organization-defined scorers.
//!
//! Scorers are registered on the [`AdapterRegistry`](super::AdapterRegistry)
//! under a handler name. A custom definition names its handler in
//! `config.handler` and may pass arguments in `config.params`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracegrade_store::TraceRecord;

use super::{AdapterError, AdapterFailure, EvaluationContext};
use crate::domain::EvaluationOutcome;

#[async_trait]
pub trait CustomScorer: Send + Sync {
    async fn score(
        &self,
        trace: &TraceRecord,
        params: &Value,
    ) -> Result<EvaluationOutcome, AdapterError>;
}

/// Adapts a synchronous closure into a [`CustomScorer`].
pub struct FnScorer<F>(pub F);

impl<F> FnScorer<F>
where
    F: Fn(&TraceRecord, &Value) -> Result<EvaluationOutcome, AdapterError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> CustomScorer for FnScorer<F>
where
    F: Fn(&TraceRecord, &Value) -> Result<EvaluationOutcome, AdapterError> + Send + Sync,
{
    async fn score(
        &self,
        trace: &TraceRecord,
        params: &Value,
    ) -> Result<EvaluationOutcome, AdapterError> {
        (self.0)(trace, params)
    }
}

pub struct CustomAdapter<'r> {
    scorers: &'r HashMap<String, Arc<dyn CustomScorer>>,
}

impl<'r> CustomAdapter<'r> {
    pub fn new(scorers: &'r HashMap<String, Arc<dyn CustomScorer>>) -> Self {
        Self { scorers }
    }

    pub async fn execute(
        &self,
        ctx: &EvaluationContext<'_>,
    ) -> Result<EvaluationOutcome, AdapterFailure> {
        let handler = ctx
            .config_str("handler")
            .ok_or_else(|| AdapterError::missing("config.handler"))?;
        let scorer = self
            .scorers
            .get(handler)
            .ok_or_else(|| AdapterError::UnknownScorer {
                source_kind: "custom".to_string(),
                name: handler.to_string(),
            })?;

        let params = ctx.config().get("params").cloned().unwrap_or(Value::Null);
        let mut outcome = scorer.score(ctx.trace, &params).await?;
        if outcome.evaluation_input.is_null() {
            outcome.evaluation_input = json!({ "handler": handler, "params": params });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracegrade_store::{EvaluationDefinition, EvaluationKind, EvaluationSource};

    struct WordCount;

    #[async_trait]
    impl CustomScorer for WordCount {
        async fn score(
            &self,
            trace: &TraceRecord,
            params: &Value,
        ) -> Result<EvaluationOutcome, AdapterError> {
            let target = params.get("target").and_then(Value::as_u64).unwrap_or(10) as f64;
            let words = crate::parse::text_of(&trace.output).split_whitespace().count() as f64;
            Ok(EvaluationOutcome::scored((words / target).min(1.0)))
        }
    }

    fn scorers() -> HashMap<String, Arc<dyn CustomScorer>> {
        let mut map: HashMap<String, Arc<dyn CustomScorer>> = HashMap::new();
        map.insert("word_count".into(), Arc::new(WordCount));
        map.insert(
            "always_fails".into(),
            Arc::new(FnScorer::new(|_, _| Err(AdapterError::Custom("scorer exploded".into())))),
        );
        map
    }

    fn def(config: Value) -> EvaluationDefinition {
        EvaluationDefinition::new(
            "custom",
            EvaluationSource::Custom,
            EvaluationKind::Metric,
            config,
        )
            .owned_by("org")
    }

    #[tokio::test]
    async fn test_handler_receives_params() {
        let scorers = scorers();
        let d = def(json!({"handler": "word_count", "params": {"target": 4}}));
        let t = TraceRecord::new("org", json!("q"), json!("one two"));
        let outcome = CustomAdapter::new(&scorers)
            .execute(&EvaluationContext::new(&d, &t))
            .await
            .unwrap();
        assert_eq!(outcome.score, Some(0.5));
        assert_eq!(outcome.evaluation_input["handler"], "word_count");
    }

    #[tokio::test]
    async fn test_unknown_handler_and_scorer_error() {
        let scorers = scorers();
        let t = TraceRecord::new("org", json!("q"), json!("a"));

        let d = def(json!({"handler": "nope"}));
        let failure = CustomAdapter::new(&scorers)
            .execute(&EvaluationContext::new(&d, &t))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AdapterError::UnknownScorer { .. }));

        let d = def(json!({"handler": "always_fails"}));
        let failure = CustomAdapter::new(&scorers)
            .execute(&EvaluationContext::new(&d, &t))
            .await
            .unwrap_err();
        assert_eq!(failure.to_string(), "custom scorer failed: scorer exploded");
    }
}
