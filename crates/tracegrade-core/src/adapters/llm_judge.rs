//! User-defined judge prompts.
//!
//! Config keys:
//!
//! | key              | meaning                                               |
//! |------------------|-------------------------------------------------------|
//! | `prompt`         | template with `{{input}}`, `{{output}}`, `{{expected}}` |
//! | `model`          | grading model (request override still wins)           |
//! | `system`         | optional system message                               |
//! | `temperature`    | sampling temperature, default 0                       |
//! | `max_tokens`     | completion cap                                        |
//! | `score_range`    | `[min, max]` the prompt scores on, default `[0, 1]`   |
//! | `pass_threshold` | derive `passed` from the normalized score             |
//! | `choices`        | `{label: score}` for categorical prompts              |

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use tracegrade_store::ContentDigest;

use super::{render_template, AdapterError, AdapterFailure, EvaluationContext};
use crate::domain::EvaluationOutcome;
use crate::gateway::{invoke_with_timeout, InvokeParams, ModelGateway};
use crate::parse::{extract_json_object, optional_score};

pub struct JudgeAdapter<'r> {
    gateway: &'r dyn ModelGateway,
    default_model: &'r str,
    call_timeout: Duration,
}

/// Parsed judge settings.
struct JudgeSettings<'a> {
    prompt: &'a str,
    range: (f64, f64),
    pass_threshold: Option<f64>,
    choices: Option<BTreeMap<String, f64>>,
    params: InvokeParams,
}

impl<'a> JudgeSettings<'a> {
    fn from_config(config: &'a Value) -> Result<Self, AdapterError> {
        let prompt = config
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AdapterError::missing("config.prompt"))?;

        let range = match config.get("score_range") {
            None | Some(Value::Null) => (0.0, 1.0),
            Some(Value::Array(bounds)) if bounds.len() == 2 => {
                match (bounds[0].as_f64(), bounds[1].as_f64()) {
                    (Some(lo), Some(hi)) if hi > lo => (lo, hi),
                    _ => {
                        return Err(AdapterError::invalid_config(
                            "score_range must be [min, max] with min < max",
                        ))
                    }
                }
            }
            Some(_) => return Err(AdapterError::invalid_config("score_range must be [min, max]")),
        };

        let choices = match config.get("choices") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => {
                let mut choices = BTreeMap::new();
                for (label, score) in map {
                    let score = score.as_f64().ok_or_else(|| {
                        AdapterError::invalid_config(format!("choice {label} has no numeric score"))
                    })?;
                    choices.insert(label.clone(), score);
                }
                Some(choices)
            }
            Some(_) => return Err(AdapterError::invalid_config("choices must be an object")),
        };

        let mut params = InvokeParams::default().with_temperature(
            config
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32,
        );
        if let Some(max_tokens) = config.get("max_tokens").and_then(Value::as_u64) {
            params = params.with_max_tokens(max_tokens as u32);
        }
        if let Some(system) = config.get("system").and_then(Value::as_str) {
            params = params.with_system(system);
        }

        Ok(Self {
            prompt,
            range,
            pass_threshold: config.get("pass_threshold").and_then(Value::as_f64),
            choices,
            params,
        })
    }

    fn format_instructions(&self) -> String {
        match &self.choices {
            Some(choices) => {
                let labels: Vec<&str> = choices.keys().map(String::as_str).collect();
                format!(
                    "Respond with a JSON object: {{\"choice\": one of {labels:?}, \"reason\": \"<short explanation>\"}}"
                )
            }
            None => format!(
                "Respond with a JSON object: {{\"score\": <number from {} to {}>, \"reason\": \"<short explanation>\"}}",
                self.range.0, self.range.1
            ),
        }
    }

    fn normalize(&self, raw: f64) -> f64 {
        (raw - self.range.0) / (self.range.1 - self.range.0)
    }
}

impl<'r> JudgeAdapter<'r> {
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
        let settings = JudgeSettings::from_config(ctx.config())?;
        let prompt = format!(
            "{}\n\n{}",
            render_template(settings.prompt, ctx, &[]),
            settings.format_instructions()
        );
        let model = ctx.grading_model(self.default_model);

        let completion = invoke_with_timeout(
            self.gateway,
            &model,
            &prompt,
            &settings.params,
            self.call_timeout,
        )
        .await
        .map_err(|error| AdapterFailure::from(error).for_model(&model))?;

        let fail = |error: AdapterError| {
            AdapterFailure::with_usage(error, model.clone(), completion.tokens, completion.cost_usd)
        };
        let parse_error = |message: String| fail(AdapterError::ResponseParse { message });

        let answer = extract_json_object(&completion.text)
            .ok_or_else(|| parse_error("judge response is not JSON".to_string()))?;

        let mut outcome = match &settings.choices {
            Some(choices) => {
                let choice = answer
                    .get("choice")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .ok_or_else(|| parse_error("judge response has no choice".to_string()))?;
                let (label, score) = choices
                    .iter()
                    .find(|(label, _)| label.eq_ignore_ascii_case(choice))
                    .ok_or_else(|| parse_error(format!("choice {choice:?} is not allowed")))?;
                if !(0.0..=1.0).contains(score) {
                    return Err(fail(AdapterError::ScoreOutOfRange { score: *score }));
                }
                EvaluationOutcome::scored(*score).with_category(label.clone())
            }
            None => {
                let raw = answer
                    .get("score")
                    .map(optional_score)
                    .transpose()
                    .map_err(parse_error)?
                    .flatten();
                match raw {
                    Some(raw) => {
                        if raw < settings.range.0 || raw > settings.range.1 {
                            return Err(fail(AdapterError::ScoreOutOfRange { score: raw }));
                        }
                        EvaluationOutcome::scored(settings.normalize(raw))
                    }
                    // A judge may answer with only a verdict.
                    None => match answer.get("passed").and_then(Value::as_bool) {
                        Some(passed) => EvaluationOutcome::check(passed),
                        None => return Err(parse_error("judge response has no score".to_string())),
                    },
                }
            }
        };

        if let Some(passed) = answer.get("passed").and_then(Value::as_bool) {
            outcome.passed = Some(passed);
        } else if let (Some(threshold), Some(score)) = (settings.pass_threshold, outcome.score) {
            outcome.passed = Some(score >= threshold);
        }
        if let Some(reason) = answer.get("reason").and_then(Value::as_str) {
            outcome = outcome.with_reason(reason);
        }
        if outcome.category.is_none() {
            if let Some(category) = answer.get("category").and_then(Value::as_str) {
                outcome = outcome.with_category(category);
            }
        }

        outcome.prompt_digest = Some(ContentDigest::from_bytes(prompt.as_bytes()));
        outcome.evaluation_input = json!({ "prompt": prompt, "params": settings.params });
        outcome.evaluation_output = json!(completion.text);
        outcome.model = Some(model);
        outcome.tokens = completion.tokens;
        outcome.cost_usd = completion.cost_usd;
        Ok(outcome)
    }
}
