//! Built-in heuristic checks. No model calls; selected with `config.check`.

use regex::RegexBuilder;
use serde_json::{json, Value};

use super::{AdapterError, AdapterFailure, EvaluationContext};
use crate::domain::EvaluationOutcome;

const REFUSAL_MARKERS: &[&str] = &[
    "i can't help",
    "i cannot help",
    "i can't assist",
    "i cannot assist",
    "i'm unable to",
    "i am unable to",
    "i won't be able to",
    "i'm sorry, but i can't",
    "as an ai",
    "i must decline",
];

pub struct InternalAdapter;

impl InternalAdapter {
    pub fn execute(
        &self,
        ctx: &EvaluationContext<'_>,
    ) -> Result<EvaluationOutcome, AdapterFailure> {
        let check = ctx
            .config_str("check")
            .ok_or_else(|| AdapterError::missing("config.check"))?;
        let config = ctx.config();
        let output = ctx.output_text();

        let outcome = match check {
            "non_empty" => non_empty(&output),
            "length" => length(&output, config)?,
            "regex" => regex_match(&output, config)?,
            "contains" => contains(&output, config)?,
            "json_schema_keys" => json_keys(&ctx.trace.output, &output, config)?,
            "refusal" => refusal(&output),
            other => {
                return Err(AdapterError::UnknownScorer {
                    source_kind: "internal".to_string(),
                    name: other.to_string(),
                }
                .into())
            }
        };
        Ok(outcome.with_input(json!({ "check": check })))
    }
}

fn non_empty(output: &str) -> EvaluationOutcome {
    let ok = !output.trim().is_empty();
    let reason = if ok {
        "output is non-empty"
    } else {
        "output is empty"
    };
    EvaluationOutcome::check(ok).with_reason(reason)
}

fn length(output: &str, config: &Value) -> Result<EvaluationOutcome, AdapterError> {
    let min = config.get("min_chars").and_then(Value::as_u64);
    let max = config.get("max_chars").and_then(Value::as_u64);
    if min.is_none() && max.is_none() {
        return Err(AdapterError::invalid_config(
            "length check needs min_chars or max_chars",
        ));
    }
    let chars = output.chars().count() as u64;
    let ok = min.map_or(true, |m| chars >= m) && max.map_or(true, |m| chars <= m);
    Ok(EvaluationOutcome::check(ok).with_reason(format!("output has {chars} characters")))
}

fn regex_match(output: &str, config: &Value) -> Result<EvaluationOutcome, AdapterError> {
    let pattern = config
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::missing("config.pattern"))?;
    let must_match = config
        .get("must_match")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let case_insensitive = config
        .get("case_insensitive")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let re = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| AdapterError::invalid_config(format!("bad pattern {pattern:?}: {e}")))?;
    let found = re.is_match(output);
    let ok = found == must_match;
    Ok(EvaluationOutcome::check(ok).with_reason(if found {
        format!("output matches {pattern:?}")
    } else {
        format!("output does not match {pattern:?}")
    }))
}

fn contains(output: &str, config: &Value) -> Result<EvaluationOutcome, AdapterError> {
    let terms: Vec<&str> = config
        .get("terms")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::missing("config.terms"))?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    if terms.is_empty() {
        return Err(AdapterError::invalid_config("contains check needs at least one term"));
    }
    let case_sensitive = config
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let require_all = match config.get("mode").and_then(Value::as_str).unwrap_or("all") {
        "all" => true,
        "any" => false,
        other => {
            return Err(AdapterError::invalid_config(format!(
                "contains mode must be all or any, got {other}"
            )))
        }
    };

    let haystack = if case_sensitive {
        output.to_string()
    } else {
        output.to_lowercase()
    };
    let missing: Vec<&str> = terms
        .iter()
        .copied()
        .filter(|term| {
            let needle = if case_sensitive {
                term.to_string()
            } else {
                term.to_lowercase()
            };
            !haystack.contains(&needle)
        })
        .collect();

    let found = terms.len() - missing.len();
    let score = found as f64 / terms.len() as f64;
    let passed = if require_all { missing.is_empty() } else { found > 0 };
    let reason = if missing.is_empty() {
        "all terms present".to_string()
    } else {
        format!("missing terms: {}", missing.join(", "))
    };
    Ok(EvaluationOutcome::scored(score)
        .with_passed(passed)
        .with_reason(reason))
}

fn json_keys(raw: &Value, text: &str, config: &Value) -> Result<EvaluationOutcome, AdapterError> {
    let required: Vec<&str> = config
        .get("required_keys")
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::missing("config.required_keys"))?
        .iter()
        .filter_map(Value::as_str)
        .collect();

    let parsed = match raw {
        Value::Object(_) => Some(raw.clone()),
        _ => serde_json::from_str::<Value>(text).ok().filter(Value::is_object),
    };
    let Some(object) = parsed else {
        return Ok(EvaluationOutcome::check(false).with_reason("output is not a JSON object"));
    };

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| object.get(*key).is_none())
        .collect();
    let ok = missing.is_empty();
    Ok(EvaluationOutcome::check(ok).with_reason(if ok {
        "all required keys present".to_string()
    } else {
        format!("missing keys: {}", missing.join(", "))
    }))
}

fn refusal(output: &str) -> EvaluationOutcome {
    let lower = output.to_lowercase();
    let refused = REFUSAL_MARKERS.iter().any(|m| lower.contains(m));
    EvaluationOutcome::check(!refused)
        .with_category(if refused { "refusal" } else { "answered" })
        .with_reason(if refused {
            "output reads as a refusal"
        } else {
            "output does not read as a refusal"
        })
}
