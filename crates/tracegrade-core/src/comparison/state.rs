//! Comparison lifecycle.
//!
//! `Created -> StageJudging -> Synthesizing -> Completed`, with `Failed`
//! reachable from every non-terminal state.

use tracegrade_store::{ComparisonId, ComparisonStatus};

use crate::domain::{EngineError, Result};
use crate::obs;

#[derive(Debug, Clone)]
pub struct ComparisonState {
    id: ComparisonId,
    status: ComparisonStatus,
}

impl ComparisonState {
    pub fn new(id: ComparisonId) -> Self {
        Self {
            id,
            status: ComparisonStatus::Created,
        }
    }

    pub fn id(&self) -> &ComparisonId {
        &self.id
    }

    pub fn status(&self) -> ComparisonStatus {
        self.status
    }

    pub fn transition(&mut self, to: ComparisonStatus) -> Result<()> {
        use ComparisonStatus::*;

        let allowed = match (self.status, to) {
            (Created, StageJudging) | (StageJudging, Synthesizing) | (Synthesizing, Completed) => {
                true
            }
            (from, Failed) => !from.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        obs::emit_comparison_transition(self.id.as_str(), self.status, to);
        self.status = to;
        Ok(())
    }
}
