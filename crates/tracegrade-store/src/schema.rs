//! Record types shared between the engine and its storage collaborators.
//!
//! - `EvaluationDefinition`: catalog entry describing an evaluation (read-only)
//! - `TraceRecord` / `ChildTrace`: recorded LLM executions and the traces the
//!   engine writes for each evaluation it runs
//! - `EvaluationResult`: one scored outcome per (trace, evaluation) execution
//! - `AnalysisRecord`: a completed multi-stage pipeline run
//! - `ComparisonRecord` / `StageResult`: blind comparison verdicts

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a recorded trace (parent or child).
    TraceId
);
string_id!(
    /// Identifier of an evaluation definition in the catalog.
    EvaluationId
);
string_id!(
    /// Identifier of a stored evaluation result.
    ResultId
);
string_id!(
    /// Identifier of a completed analysis run.
    AnalysisId
);
string_id!(
    /// Identifier of a comparison record.
    ComparisonId
);

// ---------------------------------------------------------------------------
// Token accounting
// ---------------------------------------------------------------------------

/// Token counters for a single model call or an aggregate of calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Usage known only as a total (e.g. imported from a provider summary).
    pub fn from_total(total_tokens: u64) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

// ---------------------------------------------------------------------------
// Evaluation definitions
// ---------------------------------------------------------------------------

/// Where an evaluation's scoring logic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    /// Metric from a vendor-compatible scoring catalogue.
    Vendor,
    /// Built-in heuristic check.
    Internal,
    /// Organization-supplied scorer code registered at startup.
    Custom,
    /// User-defined judge prompt graded by a model.
    LlmJudge,
}

impl std::fmt::Display for EvaluationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvaluationSource::Vendor => "vendor",
            EvaluationSource::Internal => "internal",
            EvaluationSource::Custom => "custom",
            EvaluationSource::LlmJudge => "llm_judge",
        };
        write!(f, "{s}")
    }
}

/// What shape of answer an evaluation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    Metric,
    Validator,
    Classifier,
    Judge,
}

impl std::fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvaluationKind::Metric => "metric",
            EvaluationKind::Validator => "validator",
            EvaluationKind::Classifier => "classifier",
            EvaluationKind::Judge => "judge",
        };
        write!(f, "{s}")
    }
}

/// Catalog visibility of a definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Global,
    Organization,
}

/// Catalog entry describing one evaluation.
///
/// Append-only: the engine never mutates a definition once a result
/// references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDefinition {
    pub id: EvaluationId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source: EvaluationSource,
    pub kind: EvaluationKind,
    /// Adapter-specific configuration, validated by the catalog on creation.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Owning organization (required for `custom` definitions).
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EvaluationDefinition {
    pub fn new(
        name: impl Into<String>,
        source: EvaluationSource,
        kind: EvaluationKind,
        config: serde_json::Value,
    ) -> Self {
        Self {
            id: EvaluationId::new(),
            name: name.into(),
            description: None,
            source,
            kind,
            config,
            organization_id: None,
            visibility: Visibility::Global,
            created_at: Utc::now(),
        }
    }

    /// Scope the definition to an organization.
    pub fn owned_by(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self.visibility = Visibility::Organization;
        self
    }

    pub fn with_id(mut self, id: impl Into<EvaluationId>) -> Self {
        self.id = id.into();
        self
    }

    /// Whether a requester from `organization_id` may run this definition.
    ///
    /// `custom` definitions are always organization-scoped, `vendor` and
    /// `internal` are global, `llm_judge` follows `visibility`.
    pub fn is_visible_to(&self, organization_id: &str) -> bool {
        let owned = self.organization_id.as_deref() == Some(organization_id);
        match self.source {
            EvaluationSource::Vendor | EvaluationSource::Internal => true,
            EvaluationSource::Custom => owned,
            EvaluationSource::LlmJudge => match self.visibility {
                Visibility::Global => true,
                Visibility::Organization => owned,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Traces
// ---------------------------------------------------------------------------

/// A recorded LLM execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: TraceId,
    #[serde(default)]
    pub parent_id: Option<TraceId>,
    #[serde(default)]
    pub name: Option<String>,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    /// Reference answer for reference-based metrics.
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
    #[serde(default)]
    pub model: Option<String>,
    pub organization_id: String,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TraceRecord {
    pub fn new(
        organization_id: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) -> Self {
        Self {
            id: TraceId::new(),
            parent_id: None,
            name: None,
            input,
            output,
            expected: None,
            model: None,
            organization_id: organization_id.into(),
            tokens: TokenUsage::default(),
            cost_usd: 0.0,
            duration_ms: 0,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_expected(mut self, expected: serde_json::Value) -> Self {
        self.expected = Some(expected);
        self
    }
}

/// Observability trace written for every evaluation the engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildTrace {
    pub parent_id: TraceId,
    pub evaluation_id: EvaluationId,
    pub name: String,
    pub organization_id: String,
    /// What the evaluation itself was given (prompt text or scorer args).
    pub input: serde_json::Value,
    /// What the evaluation produced (raw response or scorer detail).
    pub output: serde_json::Value,
    pub model: Option<String>,
    pub metadata: serde_json::Value,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl ChildTrace {
    /// Materialize as a stored trace under a fresh id.
    pub fn into_record(self) -> TraceRecord {
        TraceRecord {
            id: TraceId::new(),
            parent_id: Some(self.parent_id),
            name: Some(self.name),
            input: self.input,
            output: self.output,
            expected: None,
            model: self.model,
            organization_id: self.organization_id,
            tokens: self.tokens,
            cost_usd: self.cost_usd,
            duration_ms: self.duration_ms,
            metadata: serde_json::json!({
                "evaluation_id": self.evaluation_id,
                "detail": self.metadata,
            }),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Completed,
    Failed,
}

/// One scored outcome of running a definition against a trace.
///
/// Written exactly once; a re-run creates a new result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: ResultId,
    pub evaluation_id: EvaluationId,
    pub evaluation_name: String,
    pub parent_trace_id: TraceId,
    /// Trace holding the evaluation's own input/output, when one was written.
    pub child_trace_id: Option<TraceId>,
    /// Score in [0, 1]; `None` when not applicable to the evaluation kind.
    pub score: Option<f64>,
    /// Present for validator-kind evaluations only.
    pub passed: Option<bool>,
    /// Label chosen by classifier-kind evaluations.
    pub category: Option<String>,
    pub reason: Option<String>,
    pub status: EvaluationStatus,
    pub error_message: Option<String>,
    pub model: Option<String>,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn is_failed(&self) -> bool {
        self.status == EvaluationStatus::Failed
    }
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

/// Sampling parameters a pipeline stage ran with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Output of one pipeline stage inside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub name: String,
    pub output: String,
    pub model: String,
    #[serde(default)]
    pub params: StageParams,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub cost_usd: f64,
}

/// A completed multi-stage pipeline run. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: AnalysisId,
    pub organization_id: String,
    pub stages: Vec<StageOutput>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn stage(&self, name: &str) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

/// One of the two analyses under comparison, by true identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

/// Verdict of a stage or of the whole comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
    #[serde(rename = "tie")]
    Tie,
}

impl From<Side> for Winner {
    fn from(side: Side) -> Self {
        match side {
            Side::A => Winner::A,
            Side::B => Winner::B,
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Winner::A => "A",
            Winner::B => "B",
            Winner::Tie => "tie",
        };
        write!(f, "{s}")
    }
}

/// Per-criterion scores for one side; `None` marks "not applicable".
pub type CriterionScores = BTreeMap<String, Option<f64>>;

/// Scores for both sides of a stage, keyed by true identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageScores {
    #[serde(rename = "A")]
    pub a: CriterionScores,
    #[serde(rename = "B")]
    pub b: CriterionScores,
}

impl StageScores {
    pub fn side(&self, side: Side) -> &CriterionScores {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

/// Judged outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub winner: Winner,
    pub scores: StageScores,
    pub average_a: Option<f64>,
    pub average_b: Option<f64>,
    pub reasoning: String,
    /// Whether the judge was shown B's output in the first slot.
    pub presented_swapped: bool,
    pub judge_tokens: TokenUsage,
    pub judge_cost_usd: f64,
    pub duration_ms: u64,
}

/// Lifecycle of a comparison request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Created,
    StageJudging,
    Synthesizing,
    Completed,
    Failed,
}

impl ComparisonStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComparisonStatus::Completed | ComparisonStatus::Failed)
    }
}

/// Token and cost totals of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTotals {
    pub analysis_id: AnalysisId,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub models: Vec<String>,
    pub stage_count: usize,
}

/// Signed cost/quality deltas of B relative to A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparison {
    pub token_difference: i64,
    pub cost_difference_usd: f64,
    /// Rendered cost delta, e.g. `"+$0.001"`.
    pub cost_difference: String,
    /// Cost delta relative to A; `None` when A cost nothing.
    pub cost_difference_percent: Option<f64>,
    /// Mean judged quality of B relative to A; `None` without scores.
    pub quality_difference_percent: Option<f64>,
}

/// Aggregate metrics of the judge calls made for a comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeTrace {
    pub model: String,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub calls: u32,
}

/// Immutable record of one comparison request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub id: ComparisonId,
    pub organization_id: String,
    pub analysis_a_id: AnalysisId,
    pub analysis_b_id: AnalysisId,
    pub judge_model: String,
    pub evaluation_criteria: Vec<String>,
    pub status: ComparisonStatus,
    pub stage_results: Vec<StageResult>,
    /// Judge's synthesized verdict; absent when the comparison failed.
    pub overall_winner: Option<Winner>,
    /// Majority of stage winners, recorded independently of the judge.
    pub stage_majority_winner: Option<Winner>,
    pub overall_reasoning: Option<String>,
    pub analysis_a: AnalysisTotals,
    pub analysis_b: AnalysisTotals,
    pub cost_comparison: Option<CostComparison>,
    pub judge_trace: JudgeTrace,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_serializes_like_payloads() {
        assert_eq!(serde_json::to_string(&Winner::A).unwrap(), "\"A\"");
        assert_eq!(serde_json::to_string(&Winner::Tie).unwrap(), "\"tie\"");
        let w: Winner = serde_json::from_str("\"B\"").unwrap();
        assert_eq!(w, Winner::B);
    }

    #[test]
    fn test_stage_scores_keep_null_criteria() {
        let mut scores = StageScores::default();
        scores.a.insert("accuracy".to_string(), Some(0.8));
        scores.a.insert("style".to_string(), None);
        scores.b.insert("accuracy".to_string(), Some(0.6));
        scores.b.insert("style".to_string(), None);

        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["A"]["style"], serde_json::Value::Null);
        assert!(json["B"].as_object().unwrap().contains_key("style"));
    }

    #[test]
    fn test_custom_definition_is_org_scoped() {
        let def = EvaluationDefinition::new(
            "house-style",
            EvaluationSource::Custom,
            EvaluationKind::Validator,
            serde_json::json!({"handler": "house_style"}),
        )
        .owned_by("org-1");

        assert!(def.is_visible_to("org-1"));
        assert!(!def.is_visible_to("org-2"));
    }

    #[test]
    fn test_unowned_custom_definition_is_visible_to_nobody() {
        let def = EvaluationDefinition::new(
            "orphan",
            EvaluationSource::Custom,
            EvaluationKind::Metric,
            serde_json::json!({}),
        );
        assert!(!def.is_visible_to("org-1"));
    }

    #[test]
    fn test_vendor_definition_is_global_even_when_owned() {
        let def = EvaluationDefinition::new(
            "levenshtein",
            EvaluationSource::Vendor,
            EvaluationKind::Metric,
            serde_json::json!({"metric": "levenshtein"}),
        )
        .owned_by("org-1");
        assert!(def.is_visible_to("org-2"));
    }

    #[test]
    fn test_llm_judge_follows_visibility_flag() {
        let global = EvaluationDefinition::new(
            "helpfulness",
            EvaluationSource::LlmJudge,
            EvaluationKind::Judge,
            serde_json::json!({"prompt": "..."}),
        );
        assert!(global.is_visible_to("anyone"));

        let private = global.clone().owned_by("org-1");
        assert!(private.is_visible_to("org-1"));
        assert!(!private.is_visible_to("org-2"));
    }

    #[test]
    fn test_token_usage_add() {
        let total = TokenUsage::new(10, 5) + TokenUsage::new(3, 2);
        assert_eq!(total.prompt_tokens, 13);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, 20);
    }

    #[test]
    fn test_child_trace_links_parent() {
        let parent = TraceId::from("trace-1");
        let child = ChildTrace {
            parent_id: parent.clone(),
            evaluation_id: EvaluationId::from("eval-1"),
            name: "eval:levenshtein".to_string(),
            organization_id: "org-1".to_string(),
            input: serde_json::json!({"a": "x"}),
            output: serde_json::json!({"score": 1.0}),
            model: None,
            metadata: serde_json::Value::Null,
            tokens: TokenUsage::default(),
            cost_usd: 0.0,
            duration_ms: 3,
        };
        let record = child.into_record();
        assert_eq!(record.parent_id, Some(parent));
        assert_ne!(record.id.as_str(), "trace-1");
        assert_eq!(record.metadata["evaluation_id"], "eval-1");
    }
}
