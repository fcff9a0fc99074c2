//! Judge prompts for stage judging and synthesis.

use std::fmt::Write;

use tracegrade_store::{AnalysisTotals, CostComparison, StageResult};

pub const STAGE_INSTRUCTIONS: &str = "You are an impartial judge comparing two responses produced \
for the same pipeline stage. You do not know which system produced which response, and their \
order carries no meaning. Score each response on every criterion from 0.0 (poor) to 1.0 \
(excellent). Use null for a criterion that does not apply to this stage.";

pub const SYNTHESIS_INSTRUCTIONS: &str = "You are an impartial judge. Two multi-stage analyses, \
A and B, were compared stage by stage. Using the stage verdicts and the cost figures below, \
decide which analysis is better overall.";

/// Prompt for one blind stage verdict. `first` and `second` are already in
/// display order.
pub fn stage_prompt(stage: &str, criteria: &[String], first: &str, second: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{STAGE_INSTRUCTIONS}\n");
    let _ = writeln!(prompt, "Stage: {stage}\n");
    let _ = writeln!(prompt, "Criteria:");
    for criterion in criteria {
        let _ = writeln!(prompt, "- {criterion}");
    }
    let _ = writeln!(prompt, "\n<response_1>\n{first}\n</response_1>\n");
    let _ = writeln!(prompt, "<response_2>\n{second}\n</response_2>\n");

    let keys = criteria
        .iter()
        .map(|c| format!("\"{c}\": <0.0-1.0 or null>"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(
        prompt,
        "Respond with only a JSON object:\n\
         {{\"response_1\": {{{keys}}}, \"response_2\": {{{keys}}}, \"reasoning\": \"<comparison naming Response 1 and Response 2>\"}}"
    );
    prompt
}

/// Prompt for the final verdict over all stage results.
pub fn synthesis_prompt(
    criteria: &[String],
    stages: &[StageResult],
    analysis_a: &AnalysisTotals,
    analysis_b: &AnalysisTotals,
    costs: &CostComparison,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{SYNTHESIS_INSTRUCTIONS}\n");
    let _ = writeln!(prompt, "Criteria: {}\n", criteria.join(", "));
    let _ = writeln!(prompt, "Stage verdicts:");
    for stage in stages {
        let _ = writeln!(
            prompt,
            "- {}: winner {} (A avg {}, B avg {}). {}",
            stage.stage,
            stage.winner,
            fmt_avg(stage.average_a),
            fmt_avg(stage.average_b),
            stage.reasoning.trim()
        );
    }
    let _ = writeln!(prompt, "\nCost:");
    for (label, totals) in [("A", analysis_a), ("B", analysis_b)] {
        let _ = writeln!(
            prompt,
            "- {label}: {} tokens, ${:.6} across {} stages",
            totals.total_tokens, totals.cost_usd, totals.stage_count
        );
    }
    let _ = writeln!(
        prompt,
        "- B vs A: {} tokens, {}\n",
        signed(costs.token_difference),
        costs.cost_difference
    );
    let _ = write!(
        prompt,
        "Respond with only a JSON object:\n\
         {{\"overall_winner\": \"A\" | \"B\" | \"tie\", \"reasoning\": \"<markdown explanation>\"}}"
    );
    prompt
}

fn fmt_avg(avg: Option<f64>) -> String {
    avg.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn signed(n: i64) -> String {
    if n >= 0 {
        format!("+{n}")
    } else {
        n.to_string()
    }
}
