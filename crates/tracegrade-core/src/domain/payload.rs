//! Request and response contracts of the two engine operations.
//!
//! HTTP framing belongs to the host application; these are the payload
//! shapes it serializes.

use serde::{Deserialize, Serialize};
use tracegrade_store::{
    AnalysisId, AnalysisTotals, ComparisonId, ComparisonRecord, ComparisonStatus, CostComparison,
    EvaluationId, EvaluationResult, EvaluationStatus, JudgeTrace, StageScores, TraceId, Winner,
};

/// Input of "run evaluations".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvaluationsRequest {
    pub trace_id: TraceId,
    pub evaluation_ids: Vec<EvaluationId>,
    #[serde(default)]
    pub model_override: Option<String>,
    /// Requester's tenant; a trace owned by another tenant is not found.
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl RunEvaluationsRequest {
    pub fn new(trace_id: impl Into<TraceId>, evaluation_ids: Vec<EvaluationId>) -> Self {
        Self {
            trace_id: trace_id.into(),
            evaluation_ids,
            model_override: None,
            organization_id: None,
        }
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn for_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    pub model: Option<String>,
    pub tokens: u64,
    pub cost: f64,
    pub duration_ms: u64,
}

/// One element of the "run evaluations" response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub evaluation_id: EvaluationId,
    pub evaluation_name: String,
    /// The child trace written for this evaluation.
    pub trace_id: Option<TraceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub metadata: EvaluationMetadata,
    pub status: EvaluationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&EvaluationResult> for EvaluationResponse {
    fn from(result: &EvaluationResult) -> Self {
        Self {
            evaluation_id: result.evaluation_id.clone(),
            evaluation_name: result.evaluation_name.clone(),
            trace_id: result.child_trace_id.clone(),
            score: result.score,
            passed: result.passed,
            category: result.category.clone(),
            reason: result.reason.clone(),
            metadata: EvaluationMetadata {
                model: result.model.clone(),
                tokens: result.tokens.total_tokens,
                cost: result.cost_usd,
                duration_ms: result.execution_time_ms,
            },
            status: result.status,
            error_message: result.error_message.clone(),
        }
    }
}

/// Input of "create comparison".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateComparisonRequest {
    pub analysis_a_id: AnalysisId,
    pub analysis_b_id: AnalysisId,
    pub judge_model: String,
    pub evaluation_criteria: Vec<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl CreateComparisonRequest {
    pub fn new(
        analysis_a_id: impl Into<AnalysisId>,
        analysis_b_id: impl Into<AnalysisId>,
        judge_model: impl Into<String>,
        evaluation_criteria: Vec<String>,
    ) -> Self {
        Self {
            analysis_a_id: analysis_a_id.into(),
            analysis_b_id: analysis_b_id.into(),
            judge_model: judge_model.into(),
            evaluation_criteria,
            organization_id: None,
        }
    }

    pub fn for_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResponse {
    pub stage: String,
    pub winner: Winner,
    pub scores: StageScores,
    pub reasoning: String,
}

/// The "create comparison" response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResponse {
    pub id: ComparisonId,
    pub status: ComparisonStatus,
    pub overall_winner: Option<Winner>,
    pub overall_reasoning: Option<String>,
    pub stage_majority_winner: Option<Winner>,
    pub judge_model: String,
    pub evaluation_criteria: Vec<String>,
    pub stage_results: Vec<StageResponse>,
    pub analysis_a: AnalysisTotals,
    pub analysis_b: AnalysisTotals,
    pub cost_comparison: Option<CostComparison>,
    pub judge_trace: JudgeTrace,
}

impl From<&ComparisonRecord> for ComparisonResponse {
    fn from(record: &ComparisonRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            overall_winner: record.overall_winner,
            overall_reasoning: record.overall_reasoning.clone(),
            stage_majority_winner: record.stage_majority_winner,
            judge_model: record.judge_model.clone(),
            evaluation_criteria: record.evaluation_criteria.clone(),
            stage_results: record
                .stage_results
                .iter()
                .map(|s| StageResponse {
                    stage: s.stage.clone(),
                    winner: s.winner,
                    scores: s.scores.clone(),
                    reasoning: s.reasoning.clone(),
                })
                .collect(),
            analysis_a: record.analysis_a.clone(),
            analysis_b: record.analysis_b.clone(),
            cost_comparison: record.cost_comparison.clone(),
            judge_trace: record.judge_trace.clone(),
        }
    }
}
