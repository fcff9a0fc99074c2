//! Structured lifecycle events for evaluation batches and comparisons.
//!
//! Events are emitted at `info!` (failures and disagreements at `warn!`) with
//! an `event` field naming them, so they can be filtered with
//! `TRACEGRADE_LOG` and shipped as JSON.

use tracegrade_store::{ComparisonStatus, EvaluationSource, Winner};
use tracing::{info, warn};

pub fn emit_evaluation_dispatched(trace_id: &str, evaluation_id: &str, source: EvaluationSource) {
    info!(
        event = "evaluation.dispatched",
        trace_id = %trace_id,
        evaluation_id = %evaluation_id,
        source = %source,
    );
}

pub fn emit_evaluation_finished(
    trace_id: &str,
    evaluation_id: &str,
    score: Option<f64>,
    failed: bool,
    duration_ms: u64,
) {
    if failed {
        warn!(
            event = "evaluation.finished",
            trace_id = %trace_id,
            evaluation_id = %evaluation_id,
            failed = true,
            duration_ms = duration_ms,
        );
    } else {
        info!(
            event = "evaluation.finished",
            trace_id = %trace_id,
            evaluation_id = %evaluation_id,
            score = ?score,
            failed = false,
            duration_ms = duration_ms,
        );
    }
}

pub fn emit_comparison_transition(
    comparison_id: &str,
    from: ComparisonStatus,
    to: ComparisonStatus,
) {
    info!(
        event = "comparison.transition",
        comparison_id = %comparison_id,
        from = ?from,
        to = ?to,
    );
}

pub fn emit_stage_judged(
    comparison_id: &str,
    stage: &str,
    winner: Winner,
    average_a: Option<f64>,
    average_b: Option<f64>,
) {
    info!(
        event = "comparison.stage_judged",
        comparison_id = %comparison_id,
        stage = %stage,
        winner = %winner,
        average_a = ?average_a,
        average_b = ?average_b,
    );
}

pub fn emit_comparison_finished(
    comparison_id: &str,
    status: ComparisonStatus,
    winner: Option<Winner>,
    duration_ms: u64,
) {
    info!(
        event = "comparison.finished",
        comparison_id = %comparison_id,
        status = ?status,
        winner = ?winner,
        duration_ms = duration_ms,
    );
}

/// The synthesized verdict disagrees with the stage-majority winner.
pub fn emit_verdict_disagreement(comparison_id: &str, overall: Winner, majority: Winner) {
    warn!(
        event = "comparison.verdict_disagreement",
        comparison_id = %comparison_id,
        overall = %overall,
        majority = %majority,
    );
}
