//! Cost and token aggregation.
//!
//! Pure functions over recorded usage: the same inputs always produce the
//! same totals and deltas.

use std::ops::AddAssign;

use tracegrade_store::{
    AnalysisRecord, AnalysisTotals, CostComparison, Side, StageResult, TokenUsage,
};

/// Usage of one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallUsage {
    pub tokens: TokenUsage,
    pub cost_usd: f64,
}

impl CallUsage {
    pub fn new(tokens: TokenUsage, cost_usd: f64) -> Self {
        Self { tokens, cost_usd }
    }
}

/// Running sum of [`CallUsage`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub calls: u32,
}

impl AddAssign<CallUsage> for UsageTotals {
    fn add_assign(&mut self, usage: CallUsage) {
        self.tokens += usage.tokens;
        self.cost_usd += usage.cost_usd;
        self.calls += 1;
    }
}

pub fn total(usages: impl IntoIterator<Item = CallUsage>) -> UsageTotals {
    let mut totals = UsageTotals::default();
    for usage in usages {
        totals += usage;
    }
    totals
}

/// Token and cost totals across every stage of an analysis. Models are
/// listed once each, in first-use order.
pub fn analysis_totals(analysis: &AnalysisRecord) -> AnalysisTotals {
    let usage = total(
        analysis
            .stages
            .iter()
            .map(|s| CallUsage::new(s.tokens, s.cost_usd)),
    );
    let mut models: Vec<String> = Vec::new();
    for stage in &analysis.stages {
        if !models.contains(&stage.model) {
            models.push(stage.model.clone());
        }
    }
    AnalysisTotals {
        analysis_id: analysis.id.clone(),
        total_tokens: usage.tokens.total_tokens,
        cost_usd: usage.cost_usd,
        models,
        stage_count: analysis.stages.len(),
    }
}

/// Mean of the per-stage averages for one side, skipping stages where that
/// side had no applicable score.
pub fn mean_quality(stages: &[StageResult], side: Side) -> Option<f64> {
    let averages: Vec<f64> = stages
        .iter()
        .filter_map(|s| match side {
            Side::A => s.average_a,
            Side::B => s.average_b,
        })
        .collect();
    if averages.is_empty() {
        None
    } else {
        Some(averages.iter().sum::<f64>() / averages.len() as f64)
    }
}

/// Deltas of B relative to A.
///
/// `quality` is `(mean_a, mean_b)` when both sides have a quality score.
/// Percentages are `None` when A's value is zero.
pub fn compare_costs(
    a: &AnalysisTotals,
    b: &AnalysisTotals,
    quality: Option<(f64, f64)>,
) -> CostComparison {
    let cost_difference_usd = round_to(b.cost_usd - a.cost_usd, 6);
    CostComparison {
        token_difference: b.total_tokens as i64 - a.total_tokens as i64,
        cost_difference_usd,
        cost_difference: format_cost_delta(cost_difference_usd),
        cost_difference_percent: percent_change(a.cost_usd, b.cost_usd),
        quality_difference_percent: quality.and_then(|(qa, qb)| percent_change(qa, qb)),
    }
}

/// Render a USD delta with its sign: `+$0.001`, `-$0.0005`, `+$1.250`.
///
/// Rounded to six decimals, trailing zeros trimmed down to three decimals.
pub fn format_cost_delta(delta: f64) -> String {
    let rounded = round_to(delta, 6);
    let sign = if rounded < 0.0 { '-' } else { '+' };
    let mut digits = format!("{:.6}", rounded.abs());
    while digits.ends_with('0') && decimals(&digits) > 3 {
        digits.pop();
    }
    format!("{sign}${digits}")
}

fn decimals(s: &str) -> usize {
    s.split_once('.').map_or(0, |(_, frac)| frac.len())
}

fn percent_change(base: f64, value: f64) -> Option<f64> {
    if base == 0.0 {
        None
    } else {
        Some(round_to((value - base) / base * 100.0, 2))
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // Avoid "-0".
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracegrade_store::{StageOutput, StageParams, StageScores, Winner};

    fn stage(name: &str, model: &str, prompt: u64, completion: u64, cost: f64) -> StageOutput {
        StageOutput {
            name: name.to_string(),
            output: String::new(),
            model: model.to_string(),
            params: StageParams::default(),
            tokens: TokenUsage::new(prompt, completion),
            cost_usd: cost,
        }
    }

    fn totals(id: &str, tokens: u64, cost: f64) -> AnalysisTotals {
        AnalysisTotals {
            analysis_id: id.into(),
            total_tokens: tokens,
            cost_usd: cost,
            models: vec![],
            stage_count: 1,
        }
    }

    #[test]
    fn test_format_cost_delta() {
        assert_eq!(format_cost_delta(0.003 - 0.002), "+$0.001");
        assert_eq!(format_cost_delta(-0.0005), "-$0.0005");
        assert_eq!(format_cost_delta(1.25), "+$1.250");
        assert_eq!(format_cost_delta(0.0), "+$0.000");
        assert_eq!(format_cost_delta(0.0000004), "+$0.000");
    }

    #[test]
    fn test_total_sums_usage() {
        let t = total([
            CallUsage::new(TokenUsage::new(10, 5), 0.01),
            CallUsage::new(TokenUsage::new(20, 5), 0.02),
        ]);
        assert_eq!(t.tokens.total_tokens, 40);
        assert_eq!(t.calls, 2);
        assert!((t.cost_usd - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_analysis_totals_dedupes_models() {
        let analysis = AnalysisRecord {
            id: "an-1".into(),
            organization_id: "org".into(),
            stages: vec![
                stage("plan", "gpt-4o", 100, 50, 0.001),
                stage("write", "gpt-4o-mini", 200, 100, 0.0005),
                stage("edit", "gpt-4o", 10, 10, 0.0001),
            ],
            created_at: chrono::Utc::now(),
        };
        let t = analysis_totals(&analysis);
        assert_eq!(t.total_tokens, 470);
        assert_eq!(t.models, vec!["gpt-4o", "gpt-4o-mini"]);
        assert_eq!(t.stage_count, 3);
    }

    #[test]
    fn test_compare_costs_b_relative_to_a() {
        let a = totals("a", 1523, 0.002);
        let b = totals("b", 1800, 0.003);
        let c = compare_costs(&a, &b, Some((0.6, 0.9)));
        assert_eq!(c.token_difference, 277);
        assert_eq!(c.cost_difference, "+$0.001");
        assert_eq!(c.cost_difference_usd, 0.001);
        assert_eq!(c.cost_difference_percent, Some(50.0));
        assert_eq!(c.quality_difference_percent, Some(50.0));
    }

    #[test]
    fn test_compare_costs_zero_base() {
        let c = compare_costs(&totals("a", 0, 0.0), &totals("b", 10, 0.01), None);
        assert_eq!(c.cost_difference_percent, None);
        assert_eq!(c.quality_difference_percent, None);
    }

    #[test]
    fn test_compare_costs_is_idempotent() {
        let a = totals("a", 1523, 0.002);
        let b = totals("b", 1800, 0.003);
        let first = compare_costs(&a, &b, Some((0.5, 0.7)));
        for _ in 0..5 {
            assert_eq!(compare_costs(&a, &b, Some((0.5, 0.7))), first);
        }
    }

    #[test]
    fn test_mean_quality_skips_missing() {
        let result = |a: Option<f64>, b: Option<f64>| StageResult {
            stage: "s".into(),
            winner: Winner::Tie,
            scores: StageScores::default(),
            average_a: a,
            average_b: b,
            reasoning: String::new(),
            presented_swapped: false,
            judge_tokens: TokenUsage::default(),
            judge_cost_usd: 0.0,
            duration_ms: 0,
        };
        let stages = vec![result(Some(0.5), None), result(Some(1.0), Some(0.4))];
        assert_eq!(mean_quality(&stages, Side::A), Some(0.75));
        assert_eq!(mean_quality(&stages, Side::B), Some(0.4));
        assert_eq!(mean_quality(&[], Side::A), None);
    }
}
