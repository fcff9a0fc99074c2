//! Request-level error taxonomy for the engine.
//!
//! Per-item failures (one adapter call, one stage judge call) are recovered
//! where they happen and recorded as failed results. Only the variants below
//! ever reach the caller of `EvaluationExecutor::run` or
//! `ComparisonOrchestrator::compare`.

use tracegrade_store::StorageError;

/// Engine errors surfaced to the request's caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Trace, analysis or definition absent, or owned by another tenant.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("evaluation {evaluation_id} is not visible to organization {organization_id}")]
    AccessDenied {
        evaluation_id: String,
        organization_id: String,
    },

    #[error("adapter execution failed for {context}: {message}")]
    AdapterExecution { context: String, message: String },

    #[error("judge response for {stage} could not be parsed: {message}")]
    JudgeParse { stage: String, message: String },

    /// A stage failed, so the overall verdict cannot be synthesized.
    #[error("synthesis blocked by failed stage {stage}: {reason}")]
    SynthesisBlocked { stage: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid comparison transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: tracegrade_store::ComparisonStatus,
        to: tracegrade_store::ComparisonStatus,
    },

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Maps onto a 404-equivalent at the HTTP boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// Name of the stage that blocked or broke a comparison, if any.
    pub fn failing_stage(&self) -> Option<&str> {
        match self {
            EngineError::JudgeParse { stage, .. } | EngineError::SynthesisBlocked { stage, .. } => {
                Some(stage)
            }
            _ => None,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            other => EngineError::Storage(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
