//! tracegrade-store: records and storage seams for the tracegrade engine
//!
//! The engine owns no persistence. It reads traces, analyses and evaluation
//! definitions, and writes results, child traces and comparisons, all through
//! the async traits in [`storage_traits`]. Backends live with the host
//! application; this crate ships in-memory fakes and a JSON fixture loader.
//!
//! ## Key Components
//!
//! - `schema`: the record types (`EvaluationDefinition`, `EvaluationResult`,
//!   `AnalysisRecord`, `ComparisonRecord`, ...)
//! - `storage_traits`: `TraceStore`, `AnalysisStore`, `DefinitionStore`,
//!   `ResultLedger`, `ComparisonLedger`
//! - `fakes`: `Memory*` implementations of every trait
//! - `fixture`: `FixtureStore`, a fixture file loaded into the fakes

mod error;
pub mod fakes;
pub mod fixture;
pub mod schema;
pub mod storage_traits;

pub use error::StorageError;
pub use fixture::{FixtureSet, FixtureStore};
pub use schema::{
    AnalysisId, AnalysisRecord, AnalysisTotals, ChildTrace, ComparisonId, ComparisonRecord,
    ComparisonStatus, CostComparison, CriterionScores, EvaluationDefinition, EvaluationId,
    EvaluationKind, EvaluationResult, EvaluationSource, EvaluationStatus, JudgeTrace, ResultId,
    Side, StageOutput, StageParams, StageResult, StageScores, TokenUsage, TraceId, TraceRecord,
    Visibility, Winner,
};
pub use storage_traits::{
    AnalysisStore, ComparisonLedger, ContentDigest, DefinitionStore, ResultLedger, StorageResult,
    TraceStore,
};
