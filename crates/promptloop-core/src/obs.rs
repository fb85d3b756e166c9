//! Structured lifecycle events for optimization sessions.
//!
//! Field names are stable so log pipelines can key on `event = "..."`.

use tracing::{info, warn};

use crate::strategy::Strategy;

/// Span tagging every event of one session with its id.
///
/// ```ignore
/// optimizer_future.instrument(obs::session_span(&id)).await
/// ```
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("promptloop.session", session_id = %session_id)
}

pub fn emit_session_started(session_id: &str, mode: &str, execution_count: u32) {
    info!(
        event = "session.started",
        session_id = %session_id,
        mode = %mode,
        execution_count = execution_count,
    );
}

pub fn emit_round_started(round: u32, strategy: Strategy) {
    info!(event = "round.started", round = round, strategy = %strategy);
}

pub fn emit_round_scored(round: u32, stability: u8, correctness: u8, failed_runs: usize) {
    info!(
        event = "round.scored",
        round = round,
        stability = stability,
        correctness = correctness,
        failed_runs = failed_runs,
    );
}

pub fn emit_strategy_changed(round: u32, from: Strategy, to: Strategy) {
    info!(event = "strategy.changed", round = round, from = %from, to = %to);
}

pub fn emit_session_stopped(session_id: &str, reason: &str, rounds: usize) {
    info!(
        event = "session.stopped",
        session_id = %session_id,
        reason = %reason,
        rounds = rounds,
    );
}

/// Judge reply could not be decoded; a fallback verdict is used instead.
pub fn emit_judge_fallback(component: &str, error: &dyn std::fmt::Display) {
    warn!(event = "judge.fallback", component = %component, error = %error);
}

/// The persistence collaborator rejected a write; the session continues.
pub fn emit_store_failed(operation: &str, error: &dyn std::fmt::Display) {
    warn!(event = "store.failed", operation = %operation, error = %error);
}
