//! Parsing judge answers.
//!
//! Stage answers are keyed by display label; scores and reasoning are moved
//! back to their true side here, so nothing downstream ever sees a label.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracegrade_store::{CriterionScores, Side, StageScores, Winner};

use super::blind::{BlindAssignment, Label};
use crate::parse::{extract_json_object, optional_score};

#[derive(Debug, Clone, PartialEq)]
pub struct StageVerdict {
    pub scores: StageScores,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisVerdict {
    pub winner: Winner,
    pub reasoning: String,
}

/// Parse a stage answer. Every criterion appears in both score maps;
/// criteria the judge left out are `None`.
pub fn parse_stage(
    text: &str,
    criteria: &[String],
    assignment: BlindAssignment,
) -> Result<StageVerdict, String> {
    let answer = extract_json_object(text).ok_or("response is not a JSON object")?;

    let mut scores = StageScores::default();
    for label in [Label::First, Label::Second] {
        let block = answer
            .get(label.key())
            .and_then(Value::as_object)
            .ok_or_else(|| format!("missing {} scores", label.key()))?;

        let mut side_scores = CriterionScores::new();
        for criterion in criteria {
            let score = match block.get(criterion.as_str()) {
                Some(value) => optional_score(value).map_err(|e| format!("{criterion}: {e}"))?,
                None => None,
            };
            if let Some(s) = score {
                if !(0.0..=1.0).contains(&s) {
                    return Err(format!("{criterion}: score {s} is outside [0, 1]"));
                }
            }
            side_scores.insert(criterion.clone(), score);
        }

        match assignment.side_of(label) {
            Side::A => scores.a = side_scores,
            Side::B => scores.b = side_scores,
        }
    }

    let reasoning = non_empty_text(&answer, "reasoning").ok_or("missing reasoning")?;
    Ok(StageVerdict {
        scores,
        reasoning: unblind_reasoning(&reasoning, assignment),
    })
}

/// Matches `response_1`, `Response 1`, `response-2`, `Response #2` and so on.
fn label_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\bresponse[\s_#-]*([12])\b").ok())
        .as_ref()
}

/// Rewrite display labels in judge prose to the analysis they stand for.
fn unblind_reasoning(text: &str, assignment: BlindAssignment) -> String {
    let Some(pattern) = label_pattern() else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let label = if &caps[1] == "1" {
                Label::First
            } else {
                Label::Second
            };
            match assignment.side_of(label) {
                Side::A => "Analysis A",
                Side::B => "Analysis B",
            }
        })
        .into_owned()
}

/// Parse the synthesis answer.
pub fn parse_synthesis(text: &str) -> Result<SynthesisVerdict, String> {
    let answer = extract_json_object(text).ok_or("response is not a JSON object")?;
    let raw = answer
        .get("overall_winner")
        .and_then(Value::as_str)
        .ok_or("missing overall_winner")?;
    let winner = parse_winner(raw).ok_or_else(|| format!("unknown winner {raw:?}"))?;
    let reasoning = non_empty_text(&answer, "reasoning").ok_or("missing reasoning")?;
    Ok(SynthesisVerdict { winner, reasoning })
}

fn parse_winner(raw: &str) -> Option<Winner> {
    let normalized = raw.trim().to_ascii_lowercase();
    let normalized = normalized.strip_prefix("analysis ").unwrap_or(&normalized);
    match normalized {
        "a" => Some(Winner::A),
        "b" => Some(Winner::B),
        "tie" | "draw" => Some(Winner::Tie),
        _ => None,
    }
}

fn non_empty_text(answer: &Value, key: &str) -> Option<String> {
    answer
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
