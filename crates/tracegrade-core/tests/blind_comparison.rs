//! End-to-end comparisons over in-memory analyses and a scripted judge.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracegrade_core::gateway::fakes::{Reply, Rule, ScriptedGateway};
use tracegrade_core::{
    AdapterRegistry, ComparisonConfig, ComparisonOrchestrator, ComparisonResponse,
    CreateComparisonRequest, EngineError, ExecutorConfig, LabelPolicy,
};
use tracegrade_store::fakes::{MemoryAnalysisStore, MemoryComparisonLedger};
use tracegrade_store::{
    AnalysisRecord, ComparisonLedger, ComparisonStatus, StageOutput, StageParams, TokenUsage,
    Winner,
};

const STAGES: [&str; 3] = ["outline", "draft", "review"];

const B_BETTER: &str = r#"{"response_1": {"accuracy": 0.6, "clarity": 0.5},
    "response_2": {"accuracy": 0.9, "clarity": 0.8},
    "reasoning": "The second response is more precise."}"#;

const SYNTH_B: &str =
    r#"{"overall_winner": "B", "reasoning": "**B** is better at every stage for $0.001 more."}"#;

fn analysis(id: &str, org: &str, usage: [(u64, u64, f64); 3]) -> AnalysisRecord {
    AnalysisRecord {
        id: id.into(),
        organization_id: org.to_string(),
        stages: STAGES
            .iter()
            .zip(usage)
            .map(|(name, (prompt, completion, cost))| StageOutput {
                name: name.to_string(),
                output: format!("{id} output for {name}"),
                model: "gpt-4o".to_string(),
                params: StageParams::default(),
                tokens: TokenUsage::new(prompt, completion),
                cost_usd: cost,
            })
            .collect(),
        created_at: Utc::now(),
    }
}

/// A: 1523 tokens, $0.002. B: 1800 tokens, $0.003.
fn analyses() -> Vec<AnalysisRecord> {
    vec![
        analysis(
            "analysis-a",
            "org-1",
            [(400, 100, 0.0005), (500, 200, 0.001), (223, 100, 0.0005)],
        ),
        analysis(
            "analysis-b",
            "org-1",
            [(500, 100, 0.001), (600, 200, 0.001), (300, 100, 0.001)],
        ),
    ]
}

fn fixed_labels() -> ComparisonConfig {
    ComparisonConfig {
        label_policy: LabelPolicy::Fixed,
        ..ComparisonConfig::default()
    }
}

struct Harness {
    orchestrator: ComparisonOrchestrator,
    ledger: Arc<MemoryComparisonLedger>,
    gateway: Arc<ScriptedGateway>,
}

fn harness(
    gateway: ScriptedGateway,
    config: ComparisonConfig,
    records: Vec<AnalysisRecord>,
) -> Harness {
    let store = Arc::new(MemoryAnalysisStore::new());
    for r in records {
        store.insert(r);
    }
    let ledger = Arc::new(MemoryComparisonLedger::new());
    let gateway = Arc::new(gateway);
    let registry = Arc::new(AdapterRegistry::new(gateway.clone(), &ExecutorConfig::default()));
    Harness {
        orchestrator: ComparisonOrchestrator::new(store, ledger.clone(), registry, config),
        ledger,
        gateway,
    }
}

fn request() -> CreateComparisonRequest {
    CreateComparisonRequest::new(
        "analysis-a",
        "analysis-b",
        "judge-model",
        vec!["accuracy".to_string(), "clarity".to_string()],
    )
}

fn synthesis_calls(gateway: &ScriptedGateway) -> usize {
    gateway
        .calls()
        .iter()
        .filter(|c| c.prompt.contains("overall_winner"))
        .count()
}

#[tokio::test]
async fn test_b_wins_and_costs_one_tenth_of_a_cent_more() {
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(SYNTH_B)))
        .rule(Rule::any().reply(Reply::text(B_BETTER)));
    let h = harness(gateway, fixed_labels(), analyses());

    let record = h.orchestrator.compare(request()).await.unwrap();

    assert_eq!(record.status, ComparisonStatus::Completed);
    assert_eq!(record.overall_winner, Some(Winner::B));
    assert_eq!(record.stage_majority_winner, Some(Winner::B));
    assert_eq!(record.stage_results.len(), 3);
    assert!(record.stage_results.iter().all(|s| s.winner == Winner::B));

    assert_eq!(record.analysis_a.total_tokens, 1523);
    assert_eq!(record.analysis_b.total_tokens, 1800);
    let costs = record.cost_comparison.as_ref().unwrap();
    assert_eq!(costs.cost_difference, "+$0.001");
    assert_eq!(costs.token_difference, 277);

    assert_eq!(record.judge_trace.model, "judge-model");
    assert_eq!(record.judge_trace.calls, 4);
    assert_eq!(record.judge_trace.total_tokens, 4 * 160);

    assert_eq!(h.ledger.stages(&record.id).await.unwrap().len(), 3);
    assert_eq!(h.ledger.get(&record.id).await.unwrap(), record);

    let body = serde_json::to_value(ComparisonResponse::from(&record)).unwrap();
    assert_eq!(body["overall_winner"], "B");
    assert_eq!(body["stage_results"][0]["scores"]["A"]["accuracy"], 0.6);
    assert_eq!(body["stage_results"][0]["scores"]["B"]["clarity"], 0.8);
}

#[tokio::test]
async fn test_labels_are_inverted_when_b_is_shown_first() {
    // The judge always prefers whatever it sees first.
    let first_better = r#"{"response_1": {"accuracy": 0.9, "clarity": 0.9},
        "response_2": {"accuracy": 0.3, "clarity": 0.3},
        "reasoning": "Response 1 is clearly better than response_2."}"#;
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(SYNTH_B)))
        .rule(Rule::any().reply(Reply::text(first_better)));
    let config = ComparisonConfig {
        label_policy: LabelPolicy::Randomized,
        label_seed: Some(42),
        ..ComparisonConfig::default()
    };
    let h = harness(gateway, config, analyses());

    let record = h.orchestrator.compare(request()).await.unwrap();
    for stage in &record.stage_results {
        let expected = if stage.presented_swapped { Winner::B } else { Winner::A };
        assert_eq!(stage.winner, expected, "stage {}", stage.stage);

        let shown_first = if stage.presented_swapped { "analysis-b" } else { "analysis-a" };
        let prompt = h
            .gateway
            .calls()
            .into_iter()
            .find(|c| c.prompt.contains(&format!("Stage: {}", stage.stage)))
            .unwrap()
            .prompt;
        let shown = format!("<response_1>\n{shown_first} output for {}", stage.stage);
        assert!(prompt.contains(&shown));

        let reasoning = if stage.presented_swapped {
            "Analysis B is clearly better than Analysis A."
        } else {
            "Analysis A is clearly better than Analysis B."
        };
        assert_eq!(stage.reasoning, reasoning, "stage {}", stage.stage);
    }

    let stored = h.ledger.stages(&record.id).await.unwrap();
    assert!(stored
        .iter()
        .all(|s| !s.reasoning.to_ascii_lowercase().contains("response")));

    let synthesis = h
        .gateway
        .calls()
        .into_iter()
        .find(|c| c.prompt.contains("overall_winner"))
        .unwrap()
        .prompt;
    assert!(!synthesis.contains("Response 1"));
    assert!(!synthesis.contains("response_2"));
}

#[tokio::test]
async fn test_every_criterion_is_present_for_both_sides() {
    let partial = r#"{"response_1": {"accuracy": 0.7},
        "response_2": {"accuracy": 0.7, "clarity": "n/a"}, "reasoning": "similar"}"#;
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(
            r#"{"overall_winner": "tie", "reasoning": "Even."}"#,
        )))
        .rule(Rule::any().reply(Reply::text(partial)));
    let h = harness(gateway, fixed_labels(), analyses());

    let record = h.orchestrator.compare(request()).await.unwrap();
    for stage in &record.stage_results {
        for side in [&stage.scores.a, &stage.scores.b] {
            assert!(side.contains_key("accuracy"));
            assert!(side.contains_key("clarity"));
            assert_eq!(side["clarity"], None);
        }
        assert_eq!(stage.winner, Winner::Tie);
    }
    assert_eq!(record.overall_winner, Some(Winner::Tie));
}

#[tokio::test]
async fn test_close_scores_tie_and_disagreement_is_kept() {
    let close = r#"{"response_1": {"accuracy": 0.80, "clarity": 0.80},
        "response_2": {"accuracy": 0.78, "clarity": 0.79}, "reasoning": "close call"}"#;
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(
            r#"{"overall_winner": "A", "reasoning": "A reads better."}"#,
        )))
        .rule(Rule::any().reply(Reply::text(close)));
    let h = harness(gateway, fixed_labels(), analyses());

    let record = h.orchestrator.compare(request()).await.unwrap();
    assert!(record.stage_results.iter().all(|s| s.winner == Winner::Tie));
    assert_eq!(record.stage_majority_winner, Some(Winner::Tie));
    assert_eq!(record.overall_winner, Some(Winner::A));
}

#[tokio::test]
async fn test_tie_epsilon_is_configurable() {
    let close = r#"{"response_1": {"accuracy": 0.80, "clarity": 0.80},
        "response_2": {"accuracy": 0.78, "clarity": 0.78}, "reasoning": "close call"}"#;
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(
            r#"{"overall_winner": "A", "reasoning": "A by a hair."}"#,
        )))
        .rule(Rule::any().reply(Reply::text(close)));
    let config = ComparisonConfig {
        tie_epsilon: 0.01,
        ..fixed_labels()
    };
    let h = harness(gateway, config, analyses());

    let record = h.orchestrator.compare(request()).await.unwrap();
    assert!(record.stage_results.iter().all(|s| s.winner == Winner::A));
}

#[tokio::test(start_paused = true)]
async fn test_stage_timeout_blocks_synthesis() {
    let gateway = ScriptedGateway::new()
        .rule(
            Rule::prompt_contains("Stage: draft")
                .reply(Reply::text(B_BETTER))
                .delay(Duration::from_secs(300)),
        )
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(SYNTH_B)))
        .rule(Rule::any().reply(Reply::text(B_BETTER)));
    let h = harness(gateway, fixed_labels(), analyses());

    let err = h.orchestrator.compare(request()).await.unwrap_err();
    match &err {
        EngineError::SynthesisBlocked { stage, reason } => {
            assert_eq!(stage, "draft");
            assert!(reason.contains("timed out"), "{reason}");
        }
        other => panic!("expected SynthesisBlocked, got {other:?}"),
    }
    assert_eq!(err.failing_stage(), Some("draft"));

    let records = h.ledger.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, ComparisonStatus::Failed);
    assert_eq!(record.overall_winner, None);
    assert_eq!(record.failed_stage.as_deref(), Some("draft"));
    assert!(record.error.is_some());

    let persisted: Vec<String> = h
        .ledger
        .stages(&record.id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.stage)
        .collect();
    assert_eq!(persisted.len(), 2);
    assert!(persisted.contains(&"outline".to_string()));
    assert!(persisted.contains(&"review".to_string()));
    assert_eq!(synthesis_calls(&h.gateway), 0);
}

#[tokio::test]
async fn test_unparsable_stage_answer_names_the_stage() {
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("Stage: review").reply(Reply::text("Both are fine.")))
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text(SYNTH_B)))
        .rule(Rule::any().reply(Reply::text(B_BETTER)));
    let h = harness(gateway, fixed_labels(), analyses());

    let err = h.orchestrator.compare(request()).await.unwrap_err();
    assert_eq!(err.failing_stage(), Some("review"));
    let record = &h.ledger.records()[0];
    assert_eq!(record.stage_results.len(), 2);
    assert!(record.error.as_deref().unwrap().contains("could not be parsed"));
    // The unparsable answer still cost tokens.
    assert_eq!(record.judge_trace.calls, 3);
}

#[tokio::test]
async fn test_unparsable_synthesis_fails_the_comparison() {
    let gateway = ScriptedGateway::new()
        .rule(Rule::prompt_contains("overall_winner").reply(Reply::text("B, obviously")))
        .rule(Rule::any().reply(Reply::text(B_BETTER)));
    let h = harness(gateway, fixed_labels(), analyses());

    let err = h.orchestrator.compare(request()).await.unwrap_err();
    assert!(matches!(err, EngineError::JudgeParse { ref stage, .. } if stage == "synthesis"));

    let record = &h.ledger.records()[0];
    assert_eq!(record.status, ComparisonStatus::Failed);
    assert_eq!(record.stage_results.len(), 3);
    assert_eq!(record.overall_winner, None);
}

#[tokio::test]
async fn test_request_level_rejections() {
    let mut records = analyses();
    let mut short = analysis("analysis-c", "org-1", [(1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0)]);
    short.stages.pop();
    records.push(short);
    records.push(analysis("analysis-x", "org-2", [(1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0)]));
    let h = harness(ScriptedGateway::new(), fixed_labels(), records);

    let between = |a: &str, b: &str| {
        CreateComparisonRequest::new(a, b, "judge", vec!["accuracy".to_string()])
    };
    let mismatched = between("analysis-a", "analysis-c");
    assert!(matches!(
        h.orchestrator.compare(mismatched).await,
        Err(EngineError::InvalidRequest(_))
    ));

    let missing = between("analysis-a", "nope");
    assert!(h.orchestrator.compare(missing).await.unwrap_err().is_not_found());

    let other_tenant = between("analysis-a", "analysis-x");
    assert!(h.orchestrator.compare(other_tenant).await.unwrap_err().is_not_found());

    let wrong_requester = request().for_organization("org-2");
    assert!(h.orchestrator.compare(wrong_requester).await.unwrap_err().is_not_found());

    let no_criteria = CreateComparisonRequest::new("analysis-a", "analysis-b", "judge", vec![]);
    assert!(matches!(
        h.orchestrator.compare(no_criteria).await,
        Err(EngineError::InvalidRequest(_))
    ));

    assert_eq!(h.gateway.call_count(), 0);
    assert_eq!(h.ledger.finalized_count(), 0);
}
