//! Global atomic counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit the current values as one `tracing::info!`
//! event, e.g. when a CLI run ends.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    evaluations_run: AtomicU64,
    evaluations_failed: AtomicU64,
    judge_calls: AtomicU64,
    comparisons_completed: AtomicU64,
    comparisons_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_run: AtomicU64::new(0),
            evaluations_failed: AtomicU64::new(0),
            judge_calls: AtomicU64::new(0),
            comparisons_completed: AtomicU64::new(0),
            comparisons_failed: AtomicU64::new(0),
        }
    }

    /// Count one recorded evaluation result; `failed` also bumps the
    /// failure counter.
    pub fn inc_evaluations(&self, failed: bool) {
        self.evaluations_run.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.evaluations_failed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "evaluations_run", "counter incremented");
    }

    /// Count one comparison judge call (stage or synthesis).
    pub fn inc_judge_calls(&self) {
        self.judge_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_calls", "counter incremented");
    }

    pub fn inc_comparisons(&self, completed: bool) {
        let counter = if completed {
            &self.comparisons_completed
        } else {
            &self.comparisons_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "comparisons", completed, "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations_run = self.evaluations_run(),
            evaluations_failed = self.evaluations_failed(),
            judge_calls = self.judge_calls(),
            comparisons_completed = self.comparisons_completed(),
            comparisons_failed = self.comparisons_failed(),
        );
    }

    pub fn evaluations_run(&self) -> u64 {
        self.evaluations_run.load(Ordering::Relaxed)
    }

    pub fn evaluations_failed(&self) -> u64 {
        self.evaluations_failed.load(Ordering::Relaxed)
    }

    pub fn judge_calls(&self) -> u64 {
        self.judge_calls.load(Ordering::Relaxed)
    }

    pub fn comparisons_completed(&self) -> u64 {
        self.comparisons_completed.load(Ordering::Relaxed)
    }

    pub fn comparisons_failed(&self) -> u64 {
        self.comparisons_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations_run.store(0, Ordering::Relaxed);
        self.evaluations_failed.store(0, Ordering::Relaxed);
        self.judge_calls.store(0, Ordering::Relaxed);
        self.comparisons_completed.store(0, Ordering::Relaxed);
        self.comparisons_failed.store(0, Ordering::Relaxed);
    }
}
