//! Stage averages and winner rules.

use tracegrade_store::{CriterionScores, StageResult, Winner};

/// Mean over applicable criteria; `None` when every criterion is `None`.
pub fn average(scores: &CriterionScores) -> Option<f64> {
    let values: Vec<f64> = scores.values().flatten().copied().collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Higher average wins; a gap under `epsilon`, or a side with nothing
/// applicable, is a tie.
pub fn stage_winner(average_a: Option<f64>, average_b: Option<f64>, epsilon: f64) -> Winner {
    match (average_a, average_b) {
        (Some(a), Some(b)) if (a - b).abs() < epsilon => Winner::Tie,
        (Some(a), Some(b)) if a > b => Winner::A,
        (Some(_), Some(_)) => Winner::B,
        _ => Winner::Tie,
    }
}

/// Side with more stage wins; ties in the count are a tie.
pub fn majority_winner(stages: &[StageResult]) -> Winner {
    let a = stages.iter().filter(|s| s.winner == Winner::A).count();
    let b = stages.iter().filter(|s| s.winner == Winner::B).count();
    match a.cmp(&b) {
        std::cmp::Ordering::Greater => Winner::A,
        std::cmp::Ordering::Less => Winner::B,
        std::cmp::Ordering::Equal => Winner::Tie,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracegrade_store::{StageScores, TokenUsage};

    fn scores(pairs: &[(&str, Option<f64>)]) -> CriterionScores {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_average_skips_not_applicable() {
        let mixed = scores(&[("a", Some(0.5)), ("b", None), ("c", Some(1.0))]);
        assert_eq!(average(&mixed), Some(0.75));
        assert_eq!(average(&scores(&[("a", None)])), None);
    }

    #[test]
    fn test_tie_within_epsilon() {
        assert_eq!(stage_winner(Some(0.80), Some(0.78), 0.05), Winner::Tie);
        assert_eq!(stage_winner(Some(0.80), Some(0.70), 0.05), Winner::A);
        assert_eq!(stage_winner(Some(0.60), Some(0.90), 0.05), Winner::B);
        assert_eq!(stage_winner(None, Some(0.90), 0.05), Winner::Tie);
    }

    #[test]
    fn test_epsilon_is_configurable() {
        assert_eq!(stage_winner(Some(0.80), Some(0.78), 0.01), Winner::A);
        assert_eq!(stage_winner(Some(0.80), Some(0.60), 0.5), Winner::Tie);
    }

    #[test]
    fn test_majority() {
        let stage = |winner| StageResult {
            stage: "s".into(),
            winner,
            scores: StageScores::default(),
            average_a: None,
            average_b: None,
            reasoning: String::new(),
            presented_swapped: false,
            judge_tokens: TokenUsage::default(),
            judge_cost_usd: 0.0,
            duration_ms: 0,
        };
        let two_to_one = [stage(Winner::A), stage(Winner::B), stage(Winner::B)];
        assert_eq!(majority_winner(&two_to_one), Winner::B);
        assert_eq!(majority_winner(&[stage(Winner::A), stage(Winner::Tie)]), Winner::A);
        assert_eq!(majority_winner(&[stage(Winner::A), stage(Winner::B)]), Winner::Tie);
        assert_eq!(majority_winner(&[]), Winner::Tie);
    }
}
