//! Blind comparison of two analyses.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracegrade_store::{
    AnalysisRecord, AnalysisStore, AnalysisTotals, ComparisonId, ComparisonLedger,
    ComparisonRecord, ComparisonStatus, CostComparison, JudgeTrace, Side, StageResult, Winner,
};
use tracing::{debug, instrument, warn};

use super::blind::{BlindAssignment, LabelSource};
use super::parse::{parse_stage, parse_synthesis, SynthesisVerdict};
use super::prompts::{stage_prompt, synthesis_prompt};
use super::scoring::{average, majority_winner, stage_winner};
use super::state::ComparisonState;
use crate::adapters::AdapterRegistry;
use crate::aggregate::{analysis_totals, compare_costs, mean_quality, total, CallUsage};
use crate::config::ComparisonConfig;
use crate::domain::{CreateComparisonRequest, EngineError, Result};
use crate::gateway::{invoke_with_timeout, Completion, InvokeParams};
use crate::metrics::METRICS;
use crate::obs;

/// Name recorded as the failed stage when the final verdict call fails.
pub const SYNTHESIS_STAGE: &str = "synthesis";

/// A stage or synthesis call that went wrong, with the usage it spent.
struct JudgeFailure {
    stage: String,
    error: EngineError,
    usage: Option<CallUsage>,
}

/// What one comparison works on once the request is validated.
struct ComparisonPlan {
    state: ComparisonState,
    organization_id: String,
    request: CreateComparisonRequest,
    analysis_a: AnalysisRecord,
    analysis_b: AnalysisRecord,
    totals_a: AnalysisTotals,
    totals_b: AnalysisTotals,
}

pub struct ComparisonOrchestrator {
    analyses: Arc<dyn AnalysisStore>,
    ledger: Arc<dyn ComparisonLedger>,
    registry: Arc<AdapterRegistry>,
    config: ComparisonConfig,
    labels: LabelSource,
}

impl ComparisonOrchestrator {
    pub fn new(
        analyses: Arc<dyn AnalysisStore>,
        ledger: Arc<dyn ComparisonLedger>,
        registry: Arc<AdapterRegistry>,
        config: ComparisonConfig,
    ) -> Self {
        let labels = LabelSource::from_config(&config);
        Self {
            analyses,
            ledger,
            registry,
            config,
            labels,
        }
    }

    /// Judge every stage blind, then synthesize the overall verdict.
    ///
    /// Any failed stage blocks synthesis: the stages that did finish stay
    /// recorded, a `Failed` record is finalized, and
    /// [`EngineError::SynthesisBlocked`] names the stage.
    #[instrument(
        skip(self, request),
        fields(a = %request.analysis_a_id, b = %request.analysis_b_id, judge = %request.judge_model)
    )]
    pub async fn compare(&self, request: CreateComparisonRequest) -> Result<ComparisonRecord> {
        let started = Instant::now();
        validate(&request)?;
        let mut plan = self.plan(request).await?;
        plan.state.transition(ComparisonStatus::StageJudging)?;

        let stage_names: Vec<String> = plan
            .analysis_a
            .stage_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        // Drawn up front so a seeded source gives the same labels every run.
        let assignments: Vec<BlindAssignment> =
            stage_names.iter().map(|_| self.labels.next()).collect();

        let sem = Semaphore::new(self.config.max_concurrent_stages.max(1));
        let judged = join_all(stage_names.iter().zip(&assignments).map(|(stage, assignment)| {
            let plan = &plan;
            let sem = &sem;
            async move {
                let _permit = sem.acquire().await.ok();
                self.judge_stage(plan, stage, *assignment).await
            }
        }))
        .await;

        let mut stages = Vec::with_capacity(judged.len());
        let mut usage = Vec::new();
        let mut first_failure = None;
        for outcome in judged {
            match outcome {
                Ok(stage) => {
                    usage.push(CallUsage::new(stage.judge_tokens, stage.judge_cost_usd));
                    stages.push(stage);
                }
                Err(failure) => {
                    usage.extend(failure.usage);
                    first_failure.get_or_insert(failure);
                }
            }
        }

        let quality = match (
            mean_quality(&stages, Side::A),
            mean_quality(&stages, Side::B),
        ) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        };
        let costs = compare_costs(&plan.totals_a, &plan.totals_b, quality);

        if let Some(failure) = first_failure {
            return self
                .fail(plan, stages, costs, usage, failure, started)
                .await;
        }

        plan.state.transition(ComparisonStatus::Synthesizing)?;
        let verdict = match self.synthesize(&plan, &stages, &costs).await {
            Ok((verdict, call)) => {
                usage.push(call);
                verdict
            }
            Err(failure) => {
                usage.extend(failure.usage);
                return self
                    .fail(plan, stages, costs, usage, failure, started)
                    .await;
            }
        };

        let majority = majority_winner(&stages);
        if verdict.winner != majority {
            obs::emit_verdict_disagreement(plan.state.id().as_str(), verdict.winner, majority);
        }

        plan.state.transition(ComparisonStatus::Completed)?;
        let record = self.record(
            &plan,
            stages,
            Some(verdict),
            Some(majority),
            costs,
            usage,
            None,
            started,
        );
        self.ledger.finalize(record.clone()).await?;

        METRICS.inc_comparisons(true);
        obs::emit_comparison_finished(
            record.id.as_str(),
            record.status,
            record.overall_winner,
            started.elapsed().as_millis() as u64,
        );
        Ok(record)
    }

    /// Load both analyses and check they can be compared stage by stage.
    async fn plan(&self, request: CreateComparisonRequest) -> Result<ComparisonPlan> {
        let analysis_a = self.analyses.get(&request.analysis_a_id).await?;
        let analysis_b = self.analyses.get(&request.analysis_b_id).await?;

        let organization_id = request
            .organization_id
            .clone()
            .unwrap_or_else(|| analysis_a.organization_id.clone());
        for analysis in [&analysis_a, &analysis_b] {
            if analysis.organization_id != organization_id {
                return Err(EngineError::NotFound {
                    kind: "analysis",
                    id: analysis.id.to_string(),
                });
            }
        }

        let names_a = analysis_a.stage_names();
        if names_a.is_empty() {
            return Err(EngineError::InvalidRequest(format!(
                "analysis {} has no stages",
                analysis_a.id
            )));
        }
        let set_a: HashSet<&str> = names_a.iter().copied().collect();
        let set_b: HashSet<&str> = analysis_b.stage_names().into_iter().collect();
        if set_a.len() != names_a.len()
            || set_a != set_b
            || analysis_b.stages.len() != names_a.len()
        {
            return Err(EngineError::InvalidRequest(format!(
                "analyses {} and {} do not share the same stages",
                analysis_a.id, analysis_b.id
            )));
        }

        let totals_a = analysis_totals(&analysis_a);
        let totals_b = analysis_totals(&analysis_b);
        Ok(ComparisonPlan {
            state: ComparisonState::new(ComparisonId::new()),
            organization_id,
            request,
            analysis_a,
            analysis_b,
            totals_a,
            totals_b,
        })
    }

    async fn judge_call(
        &self,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<Completion, String> {
        METRICS.inc_judge_calls();
        let params = InvokeParams::default()
            .with_temperature(self.config.judge_temperature)
            .with_max_tokens(self.config.judge_max_tokens);
        invoke_with_timeout(
            self.registry.gateway(),
            model,
            prompt,
            &params,
            self.config.call_timeout(),
        )
        .await
        .map_err(|e| e.to_string())
    }

    async fn judge_stage(
        &self,
        plan: &ComparisonPlan,
        stage: &str,
        assignment: BlindAssignment,
    ) -> std::result::Result<StageResult, JudgeFailure> {
        let started = Instant::now();
        let fail = |error: EngineError, usage: Option<CallUsage>| JudgeFailure {
            stage: stage.to_string(),
            error,
            usage,
        };

        let (Some(out_a), Some(out_b)) =
            (plan.analysis_a.stage(stage), plan.analysis_b.stage(stage))
        else {
            return Err(fail(
                EngineError::InvalidRequest(format!("stage {stage} is missing an output")),
                None,
            ));
        };
        let (first, second) = assignment.order(out_a.output.as_str(), out_b.output.as_str());
        let criteria = &plan.request.evaluation_criteria;
        let prompt = stage_prompt(stage, criteria, first, second);

        let completion = self
            .judge_call(&plan.request.judge_model, &prompt)
            .await
            .map_err(|message| {
                fail(
                    EngineError::AdapterExecution {
                        context: format!("stage {stage}"),
                        message,
                    },
                    None,
                )
            })?;
        let usage = CallUsage::new(completion.tokens, completion.cost_usd);

        let verdict = parse_stage(&completion.text, criteria, assignment).map_err(|message| {
            fail(
                EngineError::JudgeParse {
                    stage: stage.to_string(),
                    message,
                },
                Some(usage),
            )
        })?;

        let average_a = average(&verdict.scores.a);
        let average_b = average(&verdict.scores.b);
        let result = StageResult {
            stage: stage.to_string(),
            winner: stage_winner(average_a, average_b, self.config.tie_epsilon),
            scores: verdict.scores,
            average_a,
            average_b,
            reasoning: verdict.reasoning,
            presented_swapped: assignment.swapped,
            judge_tokens: completion.tokens,
            judge_cost_usd: completion.cost_usd,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        self.ledger
            .record_stage(plan.state.id(), result.clone())
            .await
            .map_err(|e| fail(e.into(), Some(usage)))?;
        obs::emit_stage_judged(
            plan.state.id().as_str(),
            stage,
            result.winner,
            average_a,
            average_b,
        );
        Ok(result)
    }

    async fn synthesize(
        &self,
        plan: &ComparisonPlan,
        stages: &[StageResult],
        costs: &CostComparison,
    ) -> std::result::Result<(SynthesisVerdict, CallUsage), JudgeFailure> {
        let prompt = synthesis_prompt(
            &plan.request.evaluation_criteria,
            stages,
            &plan.totals_a,
            &plan.totals_b,
            costs,
        );
        let completion = self
            .judge_call(&plan.request.judge_model, &prompt)
            .await
            .map_err(|message| JudgeFailure {
                stage: SYNTHESIS_STAGE.to_string(),
                error: EngineError::AdapterExecution {
                    context: SYNTHESIS_STAGE.to_string(),
                    message,
                },
                usage: None,
            })?;
        let usage = CallUsage::new(completion.tokens, completion.cost_usd);

        let verdict = parse_synthesis(&completion.text).map_err(|message| JudgeFailure {
            stage: SYNTHESIS_STAGE.to_string(),
            error: EngineError::JudgeParse {
                stage: SYNTHESIS_STAGE.to_string(),
                message,
            },
            usage: Some(usage),
        })?;
        debug!(winner = %verdict.winner, "synthesis verdict");
        Ok((verdict, usage))
    }

    /// Persist a `Failed` record and return the error for the caller.
    async fn fail(
        &self,
        mut plan: ComparisonPlan,
        stages: Vec<StageResult>,
        costs: CostComparison,
        usage: Vec<CallUsage>,
        failure: JudgeFailure,
        started: Instant,
    ) -> Result<ComparisonRecord> {
        warn!(stage = %failure.stage, error = %failure.error, "comparison failed");
        plan.state.transition(ComparisonStatus::Failed)?;

        let reason = failure.error.to_string();
        let record = self.record(
            &plan,
            stages,
            None,
            None,
            costs,
            usage,
            Some((failure.stage.clone(), reason.clone())),
            started,
        );
        self.ledger.finalize(record.clone()).await?;

        METRICS.inc_comparisons(false);
        obs::emit_comparison_finished(
            record.id.as_str(),
            record.status,
            None,
            started.elapsed().as_millis() as u64,
        );

        Err(match failure.error {
            EngineError::Storage(e) => EngineError::Storage(e),
            EngineError::AdapterExecution { .. } | EngineError::JudgeParse { .. }
                if failure.stage == SYNTHESIS_STAGE =>
            {
                failure.error
            }
            _ => EngineError::SynthesisBlocked {
                stage: failure.stage,
                reason,
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        plan: &ComparisonPlan,
        stages: Vec<StageResult>,
        verdict: Option<SynthesisVerdict>,
        majority: Option<Winner>,
        costs: CostComparison,
        usage: Vec<CallUsage>,
        failure: Option<(String, String)>,
        started: Instant,
    ) -> ComparisonRecord {
        let judge = total(usage);
        let (failed_stage, error) = failure.unzip();
        let (overall_winner, overall_reasoning) = match verdict {
            Some(v) => (Some(v.winner), Some(v.reasoning)),
            None => (None, None),
        };
        ComparisonRecord {
            id: plan.state.id().clone(),
            organization_id: plan.organization_id.clone(),
            analysis_a_id: plan.analysis_a.id.clone(),
            analysis_b_id: plan.analysis_b.id.clone(),
            judge_model: plan.request.judge_model.clone(),
            evaluation_criteria: plan.request.evaluation_criteria.clone(),
            status: plan.state.status(),
            stage_results: stages,
            overall_winner,
            stage_majority_winner: majority,
            overall_reasoning,
            analysis_a: plan.totals_a.clone(),
            analysis_b: plan.totals_b.clone(),
            cost_comparison: Some(costs),
            judge_trace: JudgeTrace {
                model: plan.request.judge_model.clone(),
                total_tokens: judge.tokens.total_tokens,
                cost_usd: judge.cost_usd,
                duration_ms: started.elapsed().as_millis() as u64,
                calls: judge.calls,
            },
            failed_stage,
            error,
            created_at: Utc::now(),
        }
    }
}

fn validate(request: &CreateComparisonRequest) -> Result<()> {
    if request.analysis_a_id == request.analysis_b_id {
        return Err(EngineError::InvalidRequest(
            "an analysis cannot be compared with itself".to_string(),
        ));
    }
    if request.judge_model.trim().is_empty() {
        return Err(EngineError::InvalidRequest("judge_model is required".to_string()));
    }
    if request.evaluation_criteria.is_empty() {
        return Err(EngineError::InvalidRequest(
            "at least one evaluation criterion is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for criterion in &request.evaluation_criteria {
        if criterion.trim().is_empty() {
            return Err(EngineError::InvalidRequest("criteria must not be blank".to_string()));
        }
        if !seen.insert(criterion.as_str()) {
            return Err(EngineError::InvalidRequest(format!(
                "criterion {criterion} is listed twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(criteria: &[&str]) -> CreateComparisonRequest {
        CreateComparisonRequest::new(
            "a",
            "b",
            "judge",
            criteria.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        assert!(validate(&request(&["accuracy"])).is_ok());
        assert!(validate(&request(&[])).is_err());
        assert!(validate(&request(&["accuracy", "accuracy"])).is_err());
        assert!(validate(&request(&[" "])).is_err());

        let same = CreateComparisonRequest::new("a", "a", "judge", vec!["x".into()]);
        assert!(matches!(validate(&same), Err(EngineError::InvalidRequest(_))));
    }
}
