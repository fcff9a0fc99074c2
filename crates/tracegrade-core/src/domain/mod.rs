//! Domain types for the engine.
//!
//! - `EngineError`: request-level error taxonomy
//! - `EvaluationOutcome`: normalized adapter answer
//! - `payload`: request and response contracts of the two operations

pub mod error;
pub mod outcome;
pub mod payload;

pub use error::{EngineError, Result};
pub use outcome::EvaluationOutcome;
pub use payload::{
    ComparisonResponse, CreateComparisonRequest, EvaluationMetadata, EvaluationResponse,
    RunEvaluationsRequest, StageResponse,
};
