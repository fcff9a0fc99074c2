//! tracegrade core library
//!
//! Runs evaluations against recorded LLM traces and blind-compares two
//! multi-stage analyses with a judge model.
//!
//! - [`executor::EvaluationExecutor`]: one cost-tracked result per requested
//!   evaluation, in request order
//! - [`comparison::ComparisonOrchestrator`]: per-stage blind judging, then a
//!   synthesized verdict
//! - [`adapters::AdapterRegistry`]: dispatch to vendor, internal, custom and
//!   judge-prompt adapters
//! - [`aggregate`]: token and cost totals and deltas

pub mod adapters;
pub mod aggregate;
pub mod comparison;
pub mod config;
pub mod domain;
pub mod executor;
pub mod gateway;
pub mod metrics;
pub mod obs;
pub mod parse;
pub mod telemetry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use adapters::{
    AdapterError, AdapterFailure, AdapterRegistry, CustomScorer, DispatchOutcome,
    EvaluationContext, FnScorer,
};
pub use aggregate::{
    analysis_totals, compare_costs, format_cost_delta, mean_quality, CallUsage, UsageTotals,
};
pub use comparison::{BlindAssignment, ComparisonOrchestrator, ComparisonState, LabelSource};
pub use config::{
    ComparisonConfig, ConfigError, EngineConfig, ExecutorConfig, GatewayConfig, LabelPolicy,
    ModelPricing,
};
pub use domain::{
    ComparisonResponse, CreateComparisonRequest, EngineError, EvaluationMetadata,
    EvaluationOutcome, EvaluationResponse, Result, RunEvaluationsRequest, StageResponse,
};
pub use executor::{CancelSignal, EvaluationExecutor};
pub use gateway::{Completion, GatewayError, HttpGateway, InvokeParams, ModelGateway};
pub use metrics::METRICS;
