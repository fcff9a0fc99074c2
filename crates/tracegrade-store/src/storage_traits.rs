//! Storage trait definitions for tracegrade
//!
//! These traits define the collaborator seams the engine consumes:
//! - `TraceStore`: recorded executions (read) and child traces (write)
//! - `AnalysisStore`: completed multi-stage analyses (read)
//! - `DefinitionStore`: the evaluation catalog (read)
//! - `ResultLedger`: write-once evaluation results
//! - `ComparisonLedger`: write-once stage results and comparison records
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;
use crate::schema::{
    AnalysisId, AnalysisRecord, ChildTrace, ComparisonId, ComparisonRecord, EvaluationDefinition,
    EvaluationId, EvaluationResult, StageResult, TraceId, TraceRecord,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// Used to fingerprint prompts sent to judge models so a stored result can be
/// matched to the exact text that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Read-side collaborators
// ---------------------------------------------------------------------------

/// Recorded LLM executions.
///
/// Guarantees:
/// - `get` returns `StorageError::NotFound` for unknown ids.
/// - `create_child` always assigns a fresh id and links it to `parent_id`.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Fetch a trace by id.
    async fn get(&self, trace_id: &TraceId) -> StorageResult<TraceRecord>;

    /// Persist a child trace and return its new id.
    async fn create_child(&self, child: ChildTrace) -> StorageResult<TraceId>;
}

/// Completed analyses produced by the external pipeline.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn get(&self, analysis_id: &AnalysisId) -> StorageResult<AnalysisRecord>;
}

/// The evaluation catalog.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get(&self, evaluation_id: &EvaluationId) -> StorageResult<EvaluationDefinition>;
}

// ---------------------------------------------------------------------------
// Write-once ledgers
// ---------------------------------------------------------------------------

/// Evaluation result persistence.
///
/// Guarantees:
/// - `record` fails with `AlreadyExists` if the result id was seen before;
///   results are never updated in place.
/// - `list_for_trace` returns results in insertion order.
#[async_trait]
pub trait ResultLedger: Send + Sync {
    async fn record(&self, result: EvaluationResult) -> StorageResult<()>;

    async fn list_for_trace(&self, trace_id: &TraceId) -> StorageResult<Vec<EvaluationResult>>;
}

/// Comparison persistence.
///
/// Stage results are written as each stage finishes so that completed stages
/// survive a later failure. The comparison record itself is written once, in
/// its terminal state.
#[async_trait]
pub trait ComparisonLedger: Send + Sync {
    /// Persist one stage verdict. Fails with `AlreadyExists` for a repeated
    /// (comparison, stage) pair.
    async fn record_stage(&self, comparison_id: &ComparisonId, stage: StageResult)
        -> StorageResult<()>;

    /// Persist the terminal comparison record. Fails with `AlreadyExists` if
    /// the comparison was already finalized.
    async fn finalize(&self, record: ComparisonRecord) -> StorageResult<()>;

    async fn get(&self, comparison_id: &ComparisonId) -> StorageResult<ComparisonRecord>;

    /// Stage results recorded so far, in the order they were written.
    async fn stages(&self, comparison_id: &ComparisonId) -> StorageResult<Vec<StageResult>>;
}
