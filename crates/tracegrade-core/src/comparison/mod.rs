//! Blind multi-stage comparison.
//!
//! # Module layout
//!
//! - [`orchestrator`]: `ComparisonOrchestrator::compare`, stage judging and synthesis
//! - [`state`]: lifecycle transitions
//! - [`blind`]: label assignment and its inverse
//! - [`prompts`]: judge prompts
//! - [`parse`]: judge answer parsing
//! - [`scoring`]: averages, tie rule, stage majority

pub mod blind;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod scoring;
pub mod state;

pub use blind::{BlindAssignment, Label, LabelSource};
pub use orchestrator::{ComparisonOrchestrator, SYNTHESIS_STAGE};
pub use state::ComparisonState;
