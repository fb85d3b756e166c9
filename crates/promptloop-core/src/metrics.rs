//! Process-wide atomic counters for PromptLoop.
//!
//! Counters are incremented at the call site and never read by the loop
//! itself. Call [`Metrics::flush`] to emit the current values as a single
//! `tracing::info!` event (e.g. when a session stops).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    model_calls: AtomicU64,
    model_failures: AtomicU64,
    judge_fallbacks: AtomicU64,
    rounds_recorded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            model_calls: AtomicU64::new(0),
            model_failures: AtomicU64::new(0),
            judge_fallbacks: AtomicU64::new(0),
            rounds_recorded: AtomicU64::new(0),
        }
    }

    pub fn inc_model_calls(&self) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_model_failures(&self) {
        self.model_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_judge_fallbacks(&self) {
        self.judge_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "judge_fallbacks", "counter incremented");
    }

    pub fn inc_rounds(&self) {
        self.rounds_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            model_calls = self.model_calls(),
            model_failures = self.model_failures(),
            judge_fallbacks = self.judge_fallbacks(),
            rounds_recorded = self.rounds_recorded(),
        );
    }

    pub fn model_calls(&self) -> u64 {
        self.model_calls.load(Ordering::Relaxed)
    }

    pub fn model_failures(&self) -> u64 {
        self.model_failures.load(Ordering::Relaxed)
    }

    pub fn judge_fallbacks(&self) -> u64 {
        self.judge_fallbacks.load(Ordering::Relaxed)
    }

    pub fn rounds_recorded(&self) -> u64 {
        self.rounds_recorded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.model_calls.store(0, Ordering::Relaxed);
        self.model_failures.store(0, Ordering::Relaxed);
        self.judge_fallbacks.store(0, Ordering::Relaxed);
        self.rounds_recorded.store(0, Ordering::Relaxed);
    }
}
