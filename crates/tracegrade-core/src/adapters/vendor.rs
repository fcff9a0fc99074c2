//! Vendor-compatible metric catalogue.
//!
//! Definitions pick a metric with `config.metric`. String metrics run locally;
//! graded metrics ask a model to pick one of a fixed set of choices and map
//! the choice to a score. Names follow the common eval-library spellings, but
//! scores are not guaranteed to match any particular library numerically.

use std::time::Duration;

use serde_json::{json, Value};
use similar::TextDiff;
use tracegrade_store::ContentDigest;

use super::{render_template, AdapterError, AdapterFailure, EvaluationContext};
use crate::domain::EvaluationOutcome;
use crate::gateway::{invoke_with_timeout, InvokeParams, ModelGateway};
use crate::parse::extract_json_object;

/// A model-graded metric: prompt plus the score of each allowed choice.
struct GradedTemplate {
    name: &'static str,
    prompt: &'static str,
    choices: &'static [(&'static str, f64)],
    needs_expected: bool,
}

const FACTUALITY: GradedTemplate = GradedTemplate {
    name: "factuality",
    prompt: "You are comparing a submitted answer to an expert answer on a given question.\n\
[Question]: {{input}}\n\
[Expert]: {{expected}}\n\
[Submission]: {{output}}\n\
Compare the factual content of the submitted answer with the expert answer. Ignore differences in style, grammar, or punctuation.\n\
Select one option:\n\
(A) The submitted answer is a subset of the expert answer and is fully consistent with it.\n\
(B) The submitted answer is a superset of the expert answer and is fully consistent with it.\n\
(C) The submitted answer contains all the same details as the expert answer.\n\
(D) There is a disagreement between the submitted answer and the expert answer.\n\
(E) The answers differ, but these differences don't matter from the perspective of factuality.",
    choices: &[("A", 0.4), ("B", 0.6), ("C", 1.0), ("D", 0.0), ("E", 1.0)],
    needs_expected: true,
};

const CLOSED_QA: GradedTemplate = GradedTemplate {
    name: "closed_qa",
    prompt: "You are assessing a submitted answer on a given task based on a criterion.\n\
[Task]: {{input}}\n\
[Submission]: {{output}}\n\
[Criterion]: {{criteria}}\n\
Does the submission meet the criterion? Select Y or N.",
    choices: &[("Y", 1.0), ("N", 0.0)],
    needs_expected: false,
};

const ANSWER_RELEVANCY: GradedTemplate = GradedTemplate {
    name: "answer_relevancy",
    prompt: "You are judging whether an answer addresses the question that was asked.\n\
[Question]: {{input}}\n\
[Answer]: {{output}}\n\
Select one option:\n\
(A) The answer fully addresses the question.\n\
(B) The answer partially addresses the question or includes substantial irrelevant content.\n\
(C) The answer does not address the question.",
    choices: &[("A", 1.0), ("B", 0.5), ("C", 0.0)],
    needs_expected: false,
};

const DEFAULT_CLOSED_QA_CRITERIA: &str = "Is the submission correct and complete?";

enum VendorMetric {
    ExactMatch,
    Levenshtein,
    JsonValidity,
    NumericDifference,
    Graded(&'static GradedTemplate),
}

impl VendorMetric {
    fn parse(name: &str) -> Result<Self, AdapterError> {
        let metric = match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "exact_match" | "exactmatch" => VendorMetric::ExactMatch,
            "levenshtein" | "string_similarity" => VendorMetric::Levenshtein,
            "json_validity" | "valid_json" => VendorMetric::JsonValidity,
            "numeric_difference" | "numeric_diff" => VendorMetric::NumericDifference,
            "factuality" => VendorMetric::Graded(&FACTUALITY),
            "closed_qa" | "closedqa" => VendorMetric::Graded(&CLOSED_QA),
            "answer_relevancy" | "answer_relevance" => VendorMetric::Graded(&ANSWER_RELEVANCY),
            _ => {
                return Err(AdapterError::UnknownScorer {
                    source_kind: "vendor".to_string(),
                    name: name.to_string(),
                })
            }
        };
        Ok(metric)
    }
}

pub struct VendorAdapter<'r> {
    gateway: &'r dyn ModelGateway,
    default_model: &'r str,
    call_timeout: Duration,
}

impl<'r> VendorAdapter<'r> {
    pub fn new(
        gateway: &'r dyn ModelGateway,
        default_model: &'r str,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            default_model,
            call_timeout,
        }
    }

    pub async fn execute(
        &self,
        ctx: &EvaluationContext<'_>,
    ) -> Result<EvaluationOutcome, AdapterFailure> {
        let name = ctx
            .config_str("metric")
            .ok_or_else(|| AdapterError::missing("config.metric"))?;

        match VendorMetric::parse(name)? {
            VendorMetric::ExactMatch => Ok(exact_match(ctx)?),
            VendorMetric::Levenshtein => Ok(levenshtein(ctx)?),
            VendorMetric::JsonValidity => Ok(json_validity(ctx)),
            VendorMetric::NumericDifference => Ok(numeric_difference(ctx)?),
            VendorMetric::Graded(template) => self.graded(ctx, template).await,
        }
    }

    async fn graded(
        &self,
        ctx: &EvaluationContext<'_>,
        template: &GradedTemplate,
    ) -> Result<EvaluationOutcome, AdapterFailure> {
        if template.needs_expected && ctx.expected_text().is_none() {
            return Err(AdapterError::missing("expected").into());
        }

        let criteria = ctx
            .config_str("criteria")
            .unwrap_or(DEFAULT_CLOSED_QA_CRITERIA);
        let labels: Vec<&str> = template.choices.iter().map(|(label, _)| *label).collect();
        let prompt = format!(
            "{}\n\nRespond with a JSON object: {{\"choice\": one of {:?}, \"reason\": \"<one or two sentences>\"}}",
            render_template(template.prompt, ctx, &[("criteria", criteria)]),
            labels,
        );

        let model = ctx.grading_model(self.default_model);
        let params = InvokeParams::default().with_temperature(0.0);
        let completion = invoke_with_timeout(
            self.gateway,
            &model,
            &prompt,
            &params,
            self.call_timeout,
        )
        .await
        .map_err(|error| AdapterFailure::from(error).for_model(&model))?;

        let parse_failure = |message: String| {
            AdapterFailure::with_usage(
                AdapterError::ResponseParse { message },
                model.clone(),
                completion.tokens,
                completion.cost_usd,
            )
        };

        let answer = extract_json_object(&completion.text)
            .ok_or_else(|| parse_failure(format!("{} response is not JSON", template.name)))?;
        let choice = answer
            .get("choice")
            .and_then(Value::as_str)
            .map(normalize_choice)
            .ok_or_else(|| parse_failure("response has no choice".to_string()))?;
        let (label, score) = template
            .choices
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(&choice))
            .ok_or_else(|| parse_failure(format!("choice {choice:?} is not one of {labels:?}")))?;

        let mut outcome = EvaluationOutcome::scored(*score)
            .with_category(*label)
            .with_input(json!({"metric": template.name, "prompt": prompt}))
            .with_output(json!(completion.text));
        if let Some(reason) = answer.get("reason").and_then(Value::as_str) {
            outcome = outcome.with_reason(reason);
        }
        outcome.model = Some(model);
        outcome.tokens = completion.tokens;
        outcome.cost_usd = completion.cost_usd;
        outcome.prompt_digest = Some(ContentDigest::from_bytes(prompt.as_bytes()));
        Ok(outcome)
    }
}

/// "(C)" / "c." / " C " all mean choice `C`.
fn normalize_choice(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '(' || c == ')' || c == '.' || c.is_whitespace())
        .to_string()
}

fn require_expected(ctx: &EvaluationContext<'_>) -> Result<String, AdapterError> {
    ctx.expected_text()
        .ok_or_else(|| AdapterError::missing("expected"))
}

fn exact_match(ctx: &EvaluationContext<'_>) -> Result<EvaluationOutcome, AdapterError> {
    let expected = require_expected(ctx)?;
    let output = ctx.output_text();
    let case_sensitive = ctx
        .config()
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let matched = if case_sensitive {
        output.trim() == expected.trim()
    } else {
        output.trim().to_lowercase() == expected.trim().to_lowercase()
    };

    Ok(EvaluationOutcome::check(matched)
        .with_reason(if matched {
            "output matches the expected answer"
        } else {
            "output differs from the expected answer"
        })
        .with_input(json!({"metric": "exact_match", "expected": expected})))
}

fn levenshtein(ctx: &EvaluationContext<'_>) -> Result<EvaluationOutcome, AdapterError> {
    let expected = require_expected(ctx)?;
    let output = ctx.output_text();
    let score = if expected.is_empty() && output.is_empty() {
        1.0
    } else {
        f64::from(TextDiff::from_chars(output.as_str(), expected.as_str()).ratio())
    };
    Ok(EvaluationOutcome::scored(score)
        .with_reason(format!("character similarity {score:.3}"))
        .with_input(json!({"metric": "levenshtein", "expected": expected})))
}

fn json_validity(ctx: &EvaluationContext<'_>) -> EvaluationOutcome {
    let valid = match &ctx.trace.output {
        Value::String(s) => serde_json::from_str::<Value>(s).is_ok(),
        Value::Null => false,
        _ => true,
    };
    EvaluationOutcome::check(valid)
        .with_reason(if valid {
            "output is valid JSON"
        } else {
            "output is not valid JSON"
        })
        .with_input(json!({"metric": "json_validity"}))
}

fn numeric_difference(ctx: &EvaluationContext<'_>) -> Result<EvaluationOutcome, AdapterError> {
    let expected_raw = require_expected(ctx)?;
    let parse = |label: &str, raw: &str| {
        raw.trim()
            .parse::<f64>()
            .map_err(|_| AdapterError::ResponseParse {
                message: format!("{label} {raw:?} is not a number"),
            })
    };
    let expected = parse("expected", &expected_raw)?;
    let actual = parse("output", &ctx.output_text())?;

    let scale = expected.abs().max(actual.abs());
    let score = if scale == 0.0 {
        1.0
    } else {
        (1.0 - (expected - actual).abs() / scale).clamp(0.0, 1.0)
    };
    Ok(EvaluationOutcome::scored(score)
        .with_reason(format!("expected {expected}, got {actual}"))
        .with_input(json!({"metric": "numeric_difference", "expected": expected})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fakes::{Reply, Rule, ScriptedGateway};
    use crate::gateway::GatewayError;
    use tracegrade_store::{EvaluationDefinition, EvaluationKind, EvaluationSource, TraceRecord};

    fn def(config: Value) -> EvaluationDefinition {
        EvaluationDefinition::new(
            "vendor",
            EvaluationSource::Vendor,
            EvaluationKind::Metric,
            config,
        )
    }

    fn trace(output: Value, expected: Option<Value>) -> TraceRecord {
        let t = TraceRecord::new("org", json!("What is the capital of France?"), output);
        match expected {
            Some(e) => t.with_expected(e),
            None => t,
        }
    }

    async fn run(
        gateway: &ScriptedGateway,
        def: &EvaluationDefinition,
        trace: &TraceRecord,
    ) -> Result<EvaluationOutcome, AdapterFailure> {
        VendorAdapter::new(gateway, "grader", Duration::from_secs(30))
            .execute(&EvaluationContext::new(def, trace))
            .await
    }

    #[tokio::test]
    async fn test_exact_match_case_insensitive() {
        let gw = ScriptedGateway::new();
        let d = def(json!({"metric": "exact_match", "case_sensitive": false}));
        let t = trace(json!("PARIS "), Some(json!("paris")));
        let outcome = run(&gw, &d, &t).await.unwrap();
        assert_eq!(outcome.score, Some(1.0));
        assert_eq!(outcome.passed, Some(true));
    }

    #[tokio::test]
    async fn test_reference_metric_without_expected_fails() {
        let gw = ScriptedGateway::new();
        let d = def(json!({"metric": "exact_match"}));
        let t = trace(json!("Paris"), None);
        let failure = run(&gw, &d, &t).await.unwrap_err();
        assert!(matches!(failure.error, AdapterError::MissingField { .. }));
    }

    #[tokio::test]
    async fn test_levenshtein_scores_similarity() {
        let gw = ScriptedGateway::new();
        let d = def(json!({"metric": "levenshtein"}));
        let same = run(&gw, &d, &trace(json!("Paris"), Some(json!("Paris")))).await.unwrap();
        assert_eq!(same.score, Some(1.0));

        let close = run(&gw, &d, &trace(json!("Pariss"), Some(json!("Paris")))).await.unwrap();
        let score = close.score.unwrap();
        assert!(score > 0.8 && score < 1.0, "score {score}");
    }

    #[tokio::test]
    async fn test_json_validity() {
        let gw = ScriptedGateway::new();
        let d = def(json!({"metric": "json_validity"}));
        let ok = run(&gw, &d, &trace(json!("{\"a\": 1}"), None)).await.unwrap();
        assert_eq!(ok.passed, Some(true));
        let bad = run(&gw, &d, &trace(json!("{a: 1"), None)).await.unwrap();
        assert_eq!(bad.score, Some(0.0));
    }

    #[tokio::test]
    async fn test_numeric_difference() {
        let gw = ScriptedGateway::new();
        let d = def(json!({"metric": "numeric_difference"}));
        let outcome = run(&gw, &d, &trace(json!("90"), Some(json!("100")))).await.unwrap();
        assert!((outcome.score.unwrap() - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_metric() {
        let gw = ScriptedGateway::new();
        let d = def(json!({"metric": "bleu-9000"}));
        let failure = run(&gw, &d, &trace(json!("x"), None)).await.unwrap_err();
        assert!(matches!(failure.error, AdapterError::UnknownScorer { .. }));
    }

    #[tokio::test]
    async fn test_factuality_maps_choice_to_score() {
        let gw = ScriptedGateway::new().rule(
            Rule::any().reply(Reply::text(r#"{"choice": "(B)", "reason": "adds detail"}"#)),
        );
        let d = def(json!({"metric": "factuality"}));
        let t = trace(json!("Paris, on the Seine"), Some(json!("Paris")));
        let outcome = run(&gw, &d, &t).await.unwrap();

        assert_eq!(outcome.score, Some(0.6));
        assert_eq!(outcome.category.as_deref(), Some("B"));
        assert_eq!(outcome.reason.as_deref(), Some("adds detail"));
        assert_eq!(outcome.model.as_deref(), Some("grader"));
        assert!(outcome.prompt_digest.is_some());
        assert!(gw.calls()[0].prompt.contains("[Expert]: Paris"));
    }

    #[tokio::test]
    async fn test_graded_metric_bad_choice_keeps_usage() {
        let gw = ScriptedGateway::new()
            .rule(Rule::any().reply(Reply::text(r#"{"choice": "Z"}"#)));
        let d = def(json!({"metric": "closed_qa", "criteria": "Mentions Paris"}));
        let failure = run(&gw, &d, &trace(json!("Paris"), None)).await.unwrap_err();

        assert!(matches!(failure.error, AdapterError::ResponseParse { .. }));
        assert_eq!(failure.tokens.total_tokens, 160);
        assert!(gw.calls()[0].prompt.contains("[Criterion]: Mentions Paris"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graded_metric_slow_grader_times_out() {
        let gw = ScriptedGateway::new().rule(
            Rule::any()
                .reply(Reply::text(r#"{"choice": "(A)"}"#))
                .delay(Duration::from_secs(60)),
        );
        let d = def(json!({"metric": "factuality"}));
        let t = trace(json!("Paris"), Some(json!("Paris")));
        let failure = VendorAdapter::new(&gw, "grader", Duration::from_secs(5))
            .execute(&EvaluationContext::new(&d, &t))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            AdapterError::Gateway(GatewayError::Timeout { timeout_ms: 5000, .. })
        ));
        assert!(failure.to_string().contains("call to grader timed out after 5000ms"));
        assert_eq!(failure.model.as_deref(), Some("grader"));
    }
}
