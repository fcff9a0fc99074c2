//! Contract tests for the in-memory storage fakes.

use std::io::Write;

use chrono::Utc;
use tracegrade_store::fakes::{
    MemoryAnalysisStore, MemoryComparisonLedger, MemoryDefinitionStore, MemoryResultLedger,
    MemoryTraceStore,
};
use tracegrade_store::*;

fn result_for(trace: &TraceId) -> EvaluationResult {
    EvaluationResult {
        id: ResultId::new(),
        evaluation_id: EvaluationId::from("eval-1"),
        evaluation_name: "non-empty".to_string(),
        parent_trace_id: trace.clone(),
        child_trace_id: None,
        score: Some(1.0),
        passed: Some(true),
        category: None,
        reason: None,
        status: EvaluationStatus::Completed,
        error_message: None,
        model: None,
        tokens: TokenUsage::default(),
        cost_usd: 0.0,
        execution_time_ms: 1,
        created_at: Utc::now(),
    }
}

fn stage(name: &str) -> StageResult {
    StageResult {
        stage: name.to_string(),
        winner: Winner::Tie,
        scores: StageScores::default(),
        average_a: None,
        average_b: None,
        reasoning: String::new(),
        presented_swapped: false,
        judge_tokens: TokenUsage::default(),
        judge_cost_usd: 0.0,
        duration_ms: 0,
    }
}

#[tokio::test]
async fn test_trace_store_get_missing_is_not_found() {
    let store = MemoryTraceStore::new();
    let err = store.get(&TraceId::from("nope")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_child_links_to_parent() {
    let store = MemoryTraceStore::new();
    let parent = TraceRecord::new("org-1", serde_json::json!("q"), serde_json::json!("a"));
    let parent_id = parent.id.clone();
    store.insert(parent);

    let child_id = store
        .create_child(ChildTrace {
            parent_id: parent_id.clone(),
            evaluation_id: EvaluationId::from("eval-1"),
            name: "eval:non-empty".to_string(),
            organization_id: "org-1".to_string(),
            input: serde_json::Value::Null,
            output: serde_json::Value::Null,
            model: None,
            metadata: serde_json::Value::Null,
            tokens: TokenUsage::default(),
            cost_usd: 0.0,
            duration_ms: 0,
        })
        .await
        .unwrap();

    let child = store.get(&child_id).await.unwrap();
    assert_eq!(child.parent_id, Some(parent_id.clone()));
    assert_eq!(store.children_of(&parent_id).len(), 1);
}

#[tokio::test]
async fn test_result_ledger_is_write_once() {
    let ledger = MemoryResultLedger::new();
    let trace = TraceId::from("t-1");
    let result = result_for(&trace);

    ledger.record(result.clone()).await.unwrap();
    let err = ledger.record(result).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    // A re-run is a new result, not an edit.
    ledger.record(result_for(&trace)).await.unwrap();
    assert_eq!(ledger.list_for_trace(&trace).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_comparison_ledger_rejects_duplicate_stage() {
    let ledger = MemoryComparisonLedger::new();
    let id = ComparisonId::from("cmp-1");

    ledger.record_stage(&id, stage("facts")).await.unwrap();
    ledger.record_stage(&id, stage("summary")).await.unwrap();
    let err = ledger.record_stage(&id, stage("facts")).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    let stages = ledger.stages(&id).await.unwrap();
    assert_eq!(stages.len(), 2);
    assert!(ledger.get(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_definition_and_analysis_lookup() {
    let defs = MemoryDefinitionStore::new();
    let def = EvaluationDefinition::new(
        "length",
        EvaluationSource::Internal,
        EvaluationKind::Validator,
        serde_json::json!({"check": "length", "max_chars": 10}),
    )
    .with_id("eval-len");
    defs.insert(def.clone());
    assert_eq!(defs.get(&EvaluationId::from("eval-len")).await.unwrap(), def);

    let analyses = MemoryAnalysisStore::new();
    assert!(analyses
        .get(&AnalysisId::from("missing"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_fixture_store_loads_file() {
    let fixture = serde_json::json!({
        "traces": [{
            "id": "trace-1",
            "input": "What is 2+2?",
            "output": "4",
            "organization_id": "org-1"
        }],
        "definitions": [{
            "id": "eval-1",
            "name": "exact",
            "source": "vendor",
            "kind": "metric",
            "config": {"metric": "exact_match"}
        }],
        "analyses": [{
            "id": "analysis-a",
            "organization_id": "org-1",
            "stages": [{"name": "facts", "output": "...", "model": "gpt-4o-mini"}]
        }]
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{fixture}").unwrap();

    let store = FixtureStore::load(file.path()).await.unwrap();
    let trace = store.traces.get(&TraceId::from("trace-1")).await.unwrap();
    assert_eq!(trace.organization_id, "org-1");
    let def = store.definitions.get(&EvaluationId::from("eval-1")).await.unwrap();
    assert_eq!(def.visibility, Visibility::Global);
    let analysis = store.analyses.get(&AnalysisId::from("analysis-a")).await.unwrap();
    assert_eq!(analysis.stage_names(), vec!["facts"]);
}
