//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryTraceStore`, `MemoryAnalysisStore`, `MemoryDefinitionStore`,
//! `MemoryResultLedger` and `MemoryComparisonLedger` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryTraceStore
// ---------------------------------------------------------------------------

/// In-memory trace store backed by a `HashMap<TraceId, TraceRecord>`.
#[derive(Debug, Default)]
pub struct MemoryTraceStore {
    traces: Mutex<HashMap<TraceId, TraceRecord>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, trace: TraceRecord) {
        self.traces.lock().unwrap().insert(trace.id.clone(), trace);
    }

    /// All traces whose `parent_id` is `parent`.
    pub fn children_of(&self, parent: &TraceId) -> Vec<TraceRecord> {
        self.traces
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.parent_id.as_ref() == Some(parent))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TraceStore for MemoryTraceStore {
    async fn get(&self, trace_id: &TraceId) -> StorageResult<TraceRecord> {
        self.traces
            .lock()
            .unwrap()
            .get(trace_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("trace", trace_id))
    }

    async fn create_child(&self, child: ChildTrace) -> StorageResult<TraceId> {
        let record = child.into_record();
        let id = record.id.clone();
        self.insert(record);
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// MemoryAnalysisStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    analyses: Mutex<HashMap<AnalysisId, AnalysisRecord>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, analysis: AnalysisRecord) {
        self.analyses
            .lock()
            .unwrap()
            .insert(analysis.id.clone(), analysis);
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn get(&self, analysis_id: &AnalysisId) -> StorageResult<AnalysisRecord> {
        self.analyses
            .lock()
            .unwrap()
            .get(analysis_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("analysis", analysis_id))
    }
}

// ---------------------------------------------------------------------------
// MemoryDefinitionStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryDefinitionStore {
    definitions: Mutex<HashMap<EvaluationId, EvaluationDefinition>>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: EvaluationDefinition) {
        self.definitions
            .lock()
            .unwrap()
            .insert(definition.id.clone(), definition);
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn get(&self, evaluation_id: &EvaluationId) -> StorageResult<EvaluationDefinition> {
        self.definitions
            .lock()
            .unwrap()
            .get(evaluation_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("evaluation", evaluation_id))
    }
}

// ---------------------------------------------------------------------------
// MemoryResultLedger
// ---------------------------------------------------------------------------

/// Append-only result ledger backed by a `Vec<EvaluationResult>`.
#[derive(Debug, Default)]
pub struct MemoryResultLedger {
    results: Mutex<Vec<EvaluationResult>>,
}

impl MemoryResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<EvaluationResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultLedger for MemoryResultLedger {
    async fn record(&self, result: EvaluationResult) -> StorageResult<()> {
        let mut results = self.results.lock().unwrap();
        if results.iter().any(|r| r.id == result.id) {
            return Err(StorageError::AlreadyExists {
                kind: "evaluation result",
                id: result.id.to_string(),
            });
        }
        results.push(result);
        Ok(())
    }

    async fn list_for_trace(&self, trace_id: &TraceId) -> StorageResult<Vec<EvaluationResult>> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.parent_trace_id == trace_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryComparisonLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryComparisonLedger {
    stages: Mutex<HashMap<ComparisonId, Vec<StageResult>>>,
    records: Mutex<HashMap<ComparisonId, ComparisonRecord>>,
}

impl MemoryComparisonLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalized_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Every finalized record, oldest first.
    pub fn records(&self) -> Vec<ComparisonRecord> {
        let mut records: Vec<ComparisonRecord> =
            self.records.lock().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }
}

#[async_trait]
impl ComparisonLedger for MemoryComparisonLedger {
    async fn record_stage(
        &self,
        comparison_id: &ComparisonId,
        stage: StageResult,
    ) -> StorageResult<()> {
        let mut stages = self.stages.lock().unwrap();
        let entry = stages.entry(comparison_id.clone()).or_default();
        if entry.iter().any(|s| s.stage == stage.stage) {
            return Err(StorageError::AlreadyExists {
                kind: "stage result",
                id: format!("{comparison_id}/{}", stage.stage),
            });
        }
        entry.push(stage);
        Ok(())
    }

    async fn finalize(&self, record: ComparisonRecord) -> StorageResult<()> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists {
                kind: "comparison",
                id: record.id.to_string(),
            });
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, comparison_id: &ComparisonId) -> StorageResult<ComparisonRecord> {
        self.records
            .lock()
            .unwrap()
            .get(comparison_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("comparison", comparison_id))
    }

    async fn stages(&self, comparison_id: &ComparisonId) -> StorageResult<Vec<StageResult>> {
        Ok(self
            .stages
            .lock()
            .unwrap()
            .get(comparison_id)
            .cloned()
            .unwrap_or_default())
    }
}
