//! Batch evaluation executor.
//!
//! Runs a set of evaluation definitions against one stored trace. Each id is
//! spawned as its own task under a shared [`Semaphore`]; results are joined
//! back in request order, so the response always has exactly one entry per
//! requested id. A failing evaluation never affects its siblings.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, Semaphore};
use tracegrade_store::{
    ChildTrace, DefinitionStore, EvaluationDefinition, EvaluationId, EvaluationKind,
    EvaluationResult, EvaluationStatus, ResultId, ResultLedger, StorageError, TokenUsage,
    TraceId, TraceRecord, TraceStore,
};
use tracing::{debug, instrument, warn, Instrument};

use crate::adapters::{
    AdapterError, AdapterFailure, AdapterRegistry, DispatchOutcome, EvaluationContext,
};
use crate::config::ExecutorConfig;
use crate::domain::{EngineError, EvaluationOutcome, Result, RunEvaluationsRequest};
use crate::metrics::METRICS;
use crate::obs;

/// Default pass mark for validators that only report a score.
const DEFAULT_PASS_THRESHOLD: f64 = 0.5;

const CANCELLED_MESSAGE: &str = "cancelled before dispatch";

/// Cooperative cancellation for a batch.
///
/// Evaluations not yet dispatched when [`cancel`](Self::cancel) is called are
/// recorded as failed; evaluations already in flight run to completion.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Everything a spawned evaluation task needs, shared by all tasks of a batch.
struct BatchJob {
    traces: Arc<dyn TraceStore>,
    definitions: Arc<dyn DefinitionStore>,
    results: Arc<dyn ResultLedger>,
    registry: Arc<AdapterRegistry>,
    trace: TraceRecord,
    model_override: Option<String>,
}

#[derive(Clone)]
pub struct EvaluationExecutor {
    traces: Arc<dyn TraceStore>,
    definitions: Arc<dyn DefinitionStore>,
    results: Arc<dyn ResultLedger>,
    registry: Arc<AdapterRegistry>,
    config: ExecutorConfig,
}

impl EvaluationExecutor {
    pub fn new(
        traces: Arc<dyn TraceStore>,
        definitions: Arc<dyn DefinitionStore>,
        results: Arc<dyn ResultLedger>,
        registry: Arc<AdapterRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            traces,
            definitions,
            results,
            registry,
            config,
        }
    }

    pub async fn run(&self, request: RunEvaluationsRequest) -> Result<Vec<EvaluationResult>> {
        self.run_with_cancel(request, CancelSignal::new()).await
    }

    /// Run every requested evaluation and return one result per id, in
    /// request order.
    ///
    /// Request-level errors: the trace is missing or belongs to another
    /// organization, or the result ledger rejects a write. All other failures
    /// are recorded as failed results.
    #[instrument(
        skip(self, request, cancel),
        fields(trace_id = %request.trace_id, evaluations = request.evaluation_ids.len())
    )]
    pub async fn run_with_cancel(
        &self,
        request: RunEvaluationsRequest,
        cancel: CancelSignal,
    ) -> Result<Vec<EvaluationResult>> {
        let trace = self.traces.get(&request.trace_id).await?;
        if let Some(org) = request.organization_id.as_deref() {
            if org != trace.organization_id {
                return Err(EngineError::NotFound {
                    kind: "trace",
                    id: request.trace_id.to_string(),
                });
            }
        }

        let job = Arc::new(BatchJob {
            traces: Arc::clone(&self.traces),
            definitions: Arc::clone(&self.definitions),
            results: Arc::clone(&self.results),
            registry: Arc::clone(&self.registry),
            trace,
            model_override: request.model_override,
        });
        let sem = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut tasks = Vec::with_capacity(request.evaluation_ids.len());
        for evaluation_id in request.evaluation_ids.iter().cloned() {
            let job = Arc::clone(&job);
            let sem = Arc::clone(&sem);
            let cancel = cancel.clone();

            tasks.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = sem.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) if !cancel.is_cancelled() => {
                        evaluate_one(&job, evaluation_id).await
                    }
                    _ => failed_result(
                        &job.trace.id,
                        evaluation_id.clone(),
                        evaluation_id.to_string(),
                        CANCELLED_MESSAGE,
                    ),
                };
                persist(&job, result).await
            }
            .in_current_span()));
        }

        // Joined in spawn order, which is request order.
        let mut results = Vec::with_capacity(tasks.len());
        let mut storage_error = None;
        for (task, evaluation_id) in tasks.into_iter().zip(request.evaluation_ids) {
            let recorded = match task.await {
                Ok(recorded) => recorded,
                Err(join_err) => {
                    warn!(
                        evaluation_id = %evaluation_id,
                        error = %join_err,
                        "evaluation task aborted"
                    );
                    let result = failed_result(
                        &job.trace.id,
                        evaluation_id.clone(),
                        evaluation_id.to_string(),
                        &AdapterError::Aborted(join_err.to_string()).to_string(),
                    );
                    persist(&job, result).await
                }
            };
            match recorded {
                Ok(result) => results.push(result),
                Err(e) => {
                    storage_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = storage_error {
            return Err(e.into());
        }
        debug!(
            completed = results.iter().filter(|r| !r.is_failed()).count(),
            failed = results.iter().filter(|r| r.is_failed()).count(),
            "batch finished"
        );
        Ok(results)
    }
}

async fn persist(
    job: &BatchJob,
    result: EvaluationResult,
) -> std::result::Result<EvaluationResult, StorageError> {
    job.results.record(result.clone()).await?;
    METRICS.inc_evaluations(result.is_failed());
    obs::emit_evaluation_finished(
        job.trace.id.as_str(),
        result.evaluation_id.as_str(),
        result.score,
        result.is_failed(),
        result.execution_time_ms,
    );
    Ok(result)
}

async fn evaluate_one(job: &BatchJob, evaluation_id: EvaluationId) -> EvaluationResult {
    let trace = &job.trace;

    let definition = match job.definitions.get(&evaluation_id).await {
        Ok(d) => d,
        Err(e) => {
            let message = if e.is_not_found() {
                format!("evaluation definition {evaluation_id} not found")
            } else {
                e.to_string()
            };
            return failed_result(
                &trace.id,
                evaluation_id.clone(),
                evaluation_id.to_string(),
                &message,
            );
        }
    };

    if !definition.is_visible_to(&trace.organization_id) {
        let denied = EngineError::AccessDenied {
            evaluation_id: evaluation_id.to_string(),
            organization_id: trace.organization_id.clone(),
        };
        return failed_result(&trace.id, evaluation_id, definition.name, &denied.to_string());
    }

    obs::emit_evaluation_dispatched(trace.id.as_str(), evaluation_id.as_str(), definition.source);
    let ctx = EvaluationContext::new(&definition, trace)
        .with_model_override(job.model_override.as_deref());
    let dispatched = normalize(&definition, job.registry.dispatch(&ctx).await);

    let mut result = match &dispatched {
        Ok(outcome) => EvaluationResult {
            id: ResultId::new(),
            evaluation_id: evaluation_id.clone(),
            evaluation_name: definition.name.clone(),
            parent_trace_id: trace.id.clone(),
            child_trace_id: None,
            score: outcome.score,
            passed: outcome.passed,
            category: outcome.category.clone(),
            reason: outcome.reason.clone(),
            status: EvaluationStatus::Completed,
            error_message: None,
            model: outcome.model.clone(),
            tokens: outcome.tokens,
            cost_usd: outcome.cost_usd,
            execution_time_ms: outcome.duration_ms,
            created_at: Utc::now(),
        },
        Err(failure) => {
            warn!(evaluation_id = %evaluation_id, error = %failure, "evaluation failed");
            let mut result = failed_result(
                &trace.id,
                evaluation_id.clone(),
                definition.name.clone(),
                &failure.to_string(),
            );
            result.model = failure.model.clone();
            result.tokens = failure.tokens;
            result.cost_usd = failure.cost_usd;
            result.execution_time_ms = failure.duration_ms;
            result
        }
    };

    let child = child_trace(job, &definition, &result, &dispatched);
    match job.traces.create_child(child).await {
        Ok(child_id) => result.child_trace_id = Some(child_id),
        Err(e) => {
            warn!(evaluation_id = %evaluation_id, error = %e, "failed to write child trace");
        }
    }
    result
}

/// Enforce the shared scoring contract on a dispatch outcome.
///
/// `passed` only survives for validators. A validator that reports only a
/// score passes at `config.pass_threshold` (default 0.5); one that reports
/// neither is a failure.
fn normalize(definition: &EvaluationDefinition, dispatched: DispatchOutcome) -> DispatchOutcome {
    let mut outcome: EvaluationOutcome = dispatched?;
    if definition.kind != EvaluationKind::Validator {
        outcome.passed = None;
        return Ok(outcome);
    }
    if outcome.passed.is_none() {
        let threshold = definition
            .config
            .get("pass_threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_PASS_THRESHOLD);
        match outcome.score {
            Some(score) => outcome.passed = Some(score >= threshold),
            None => {
                return Err(AdapterFailure {
                    error: AdapterError::ResponseParse {
                        message: "validator produced neither a score nor a verdict".to_string(),
                    },
                    model: outcome.model,
                    tokens: outcome.tokens,
                    cost_usd: outcome.cost_usd,
                    duration_ms: outcome.duration_ms,
                })
            }
        }
    }
    Ok(outcome)
}

fn child_trace(
    job: &BatchJob,
    definition: &EvaluationDefinition,
    result: &EvaluationResult,
    dispatched: &DispatchOutcome,
) -> ChildTrace {
    let (input, output) = match dispatched {
        Ok(outcome) => (outcome.evaluation_input.clone(), outcome.evaluation_output.clone()),
        Err(failure) => (
            json!({ "config": definition.config }),
            json!({ "error": failure.to_string() }),
        ),
    };
    let prompt_digest = dispatched
        .as_ref()
        .ok()
        .and_then(|o| o.prompt_digest.as_ref())
        .map(|d| d.to_string());

    ChildTrace {
        parent_id: job.trace.id.clone(),
        evaluation_id: result.evaluation_id.clone(),
        name: format!("evaluation:{}", definition.name),
        organization_id: job.trace.organization_id.clone(),
        input,
        output,
        model: result.model.clone(),
        metadata: json!({
            "source": definition.source,
            "kind": definition.kind,
            "score": result.score,
            "passed": result.passed,
            "category": result.category,
            "reason": result.reason,
            "status": result.status,
            "error_message": result.error_message,
            "prompt_digest": prompt_digest,
        }),
        tokens: result.tokens,
        cost_usd: result.cost_usd,
        duration_ms: result.execution_time_ms,
    }
}

fn failed_result(
    parent_trace_id: &TraceId,
    evaluation_id: EvaluationId,
    evaluation_name: String,
    message: &str,
) -> EvaluationResult {
    EvaluationResult {
        id: ResultId::new(),
        evaluation_id,
        evaluation_name,
        parent_trace_id: parent_trace_id.clone(),
        child_trace_id: None,
        score: None,
        passed: None,
        category: None,
        reason: None,
        status: EvaluationStatus::Failed,
        error_message: Some(message.to_string()),
        model: None,
        tokens: TokenUsage::default(),
        cost_usd: 0.0,
        execution_time_ms: 0,
        created_at: Utc::now(),
    }
}
