//! History-driven strategy selection.
//!
//! After every recorded round (once at least two exist) the tracker looks at
//! the newest [`WINDOW_SIZE`] rounds and applies these rules, first match wins:
//!
//! 1. two or more consecutive declines → `Conservative`
//! 2. stagnation (3+ rounds, newest vs oldest average within 3 points) → `Aggressive`
//! 3. stability more than 15 below correctness → `StabilityFocus`
//! 4. correctness more than 15 below stability → `CorrectnessFocus`
//! 5. non-standard strategy and newest average up more than 5 → `Standard`
//! 6. otherwise unchanged
//!
//! Each re-derivation is a pure function of the current strategy and the
//! stored records; nothing else carries over between rounds.

use serde::{Deserialize, Serialize};

use super::Strategy;
use crate::domain::{EvaluationRecord, PromptLoopError, Result};

/// Number of most recent rounds inspected.
pub const WINDOW_SIZE: usize = 5;

/// Consecutive declines that force `Conservative`.
pub const DECLINE_TRIGGER: usize = 2;

/// Minimum rounds in the window before stagnation is considered.
pub const STAGNATION_MIN_ROUNDS: usize = 3;

/// Newest-vs-oldest average spread below which the window is stagnant.
pub const STAGNATION_THRESHOLD: f64 = 3.0;

/// Axis gap beyond which the newest round is skewed.
pub const SKEW_THRESHOLD: i32 = 15;

/// Round-over-round gain that returns a non-standard strategy to `Standard`.
pub const RECOVERY_THRESHOLD: f64 = 5.0;

/// Trend facts derived from a window of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSignals {
    pub consecutive_declines: usize,
    pub stagnating: bool,
    pub stability_deficit: bool,
    pub correctness_deficit: bool,
    /// Newest average minus the previous round's average.
    pub last_change: Option<f64>,
}

/// Derive trend signals from a window ordered oldest → newest.
pub fn analyze_trend(window: &[EvaluationRecord]) -> TrendSignals {
    let Some(newest) = window.last() else {
        return TrendSignals::default();
    };

    let consecutive_declines = window
        .windows(2)
        .rev()
        .take_while(|pair| pair[1].average_score < pair[0].average_score)
        .count();

    let stagnating = window.len() >= STAGNATION_MIN_ROUNDS
        && (newest.average_score - window[0].average_score).abs() < STAGNATION_THRESHOLD;

    let gap = i32::from(newest.correctness_score) - i32::from(newest.stability_score);

    let last_change = window
        .len()
        .checked_sub(2)
        .map(|prev| newest.average_score - window[prev].average_score);

    TrendSignals {
        consecutive_declines,
        stagnating,
        stability_deficit: gap > SKEW_THRESHOLD,
        correctness_deficit: -gap > SKEW_THRESHOLD,
        last_change,
    }
}

/// Pick the strategy for the next round from the full history.
pub fn next_strategy(current: Strategy, history: &[EvaluationRecord]) -> Strategy {
    if history.len() < 2 {
        return current;
    }
    let window = &history[history.len().saturating_sub(WINDOW_SIZE)..];
    let signals = analyze_trend(window);

    if signals.consecutive_declines >= DECLINE_TRIGGER {
        Strategy::Conservative
    } else if signals.stagnating {
        Strategy::Aggressive
    } else if signals.stability_deficit {
        Strategy::StabilityFocus
    } else if signals.correctness_deficit {
        Strategy::CorrectnessFocus
    } else if current != Strategy::Standard
        && signals
            .last_change
            .is_some_and(|change| change > RECOVERY_THRESHOLD)
    {
        Strategy::Standard
    } else {
        current
    }
}

/// Outcome of recording a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyTransition {
    pub from: Strategy,
    pub to: Strategy,
}

impl StrategyTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Per-session round history and the strategy derived from it.
///
/// Owned by exactly one orchestrator; rounds are recorded strictly in order.
#[derive(Debug, Clone, Default)]
pub struct StrategyTracker {
    history: Vec<EvaluationRecord>,
    current: Strategy,
}

impl StrategyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed round and re-derive the active strategy.
    ///
    /// # Errors
    ///
    /// Returns `PromptLoopError::RoundOutOfOrder` if the round number does not
    /// strictly increase.
    pub fn record(&mut self, record: EvaluationRecord) -> Result<StrategyTransition> {
        let last = self.last_round();
        if record.round <= last {
            return Err(PromptLoopError::RoundOutOfOrder {
                round: record.round,
                last,
            });
        }

        self.history.push(record);
        let from = self.current;
        self.current = next_strategy(from, &self.history);
        Ok(StrategyTransition {
            from,
            to: self.current,
        })
    }

    /// Clear history and return to `Standard`.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = Strategy::Standard;
    }

    pub fn current(&self) -> Strategy {
        self.current
    }

    /// Instruction fragment for the next evaluation.
    pub fn instruction(&self) -> &'static str {
        self.current.instruction()
    }

    pub fn history(&self) -> &[EvaluationRecord] {
        &self.history
    }

    /// Round number of the newest record, 0 when empty.
    pub fn last_round(&self) -> u32 {
        self.history.last().map(|r| r.round).unwrap_or(0)
    }

    /// The newest [`WINDOW_SIZE`] records, oldest first.
    pub fn window(&self) -> &[EvaluationRecord] {
        &self.history[self.history.len().saturating_sub(WINDOW_SIZE)..]
    }

    pub fn signals(&self) -> TrendSignals {
        analyze_trend(self.window())
    }

    /// Highest-average record; the earliest wins ties.
    pub fn best_record(&self) -> Option<&EvaluationRecord> {
        self.history.iter().fold(None, |best, r| match best {
            Some(b) if b.average_score >= r.average_score => Some(b),
            _ => Some(r),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(round: u32, stability: u8, correctness: u8) -> EvaluationRecord {
        EvaluationRecord::new(round, stability, correctness, "p", "p")
    }

    fn balanced(round: u32, avg: u8) -> EvaluationRecord {
        rec(round, avg, avg)
    }

    #[test]
    fn test_decline_count_stops_at_first_non_decrease() {
        let window = vec![balanced(1, 60), balanced(2, 80), balanced(3, 70), balanced(4, 65)];
        assert_eq!(analyze_trend(&window).consecutive_declines, 2);

        let window = vec![balanced(1, 60), balanced(2, 60)];
        assert_eq!(analyze_trend(&window).consecutive_declines, 0);
    }

    #[test]
    fn test_stagnation_needs_three_rounds() {
        let two = vec![balanced(1, 70), balanced(2, 71)];
        assert!(!analyze_trend(&two).stagnating);

        let three = vec![balanced(1, 70), balanced(2, 71), balanced(3, 69)];
        assert!(analyze_trend(&three).stagnating);
    }

    #[test]
    fn test_skew_threshold_is_exclusive() {
        assert!(!analyze_trend(&[rec(1, 45, 60)]).stability_deficit);
        assert!(analyze_trend(&[rec(1, 44, 60)]).stability_deficit);
        assert!(analyze_trend(&[rec(1, 80, 60)]).correctness_deficit);
    }

    #[test]
    fn test_single_round_never_changes_strategy() {
        let mut tracker = StrategyTracker::new();
        tracker.record(rec(1, 20, 90)).unwrap();
        assert_eq!(tracker.current(), Strategy::Standard);
    }

    #[test]
    fn test_decline_outranks_skew() {
        let mut tracker = StrategyTracker::new();
        tracker.record(rec(1, 90, 90)).unwrap();
        tracker.record(rec(2, 80, 80)).unwrap();
        tracker.record(rec(3, 40, 70)).unwrap();
        assert_eq!(tracker.current(), Strategy::Conservative);
    }

    #[test]
    fn test_stagnation_outranks_skew() {
        let mut tracker = StrategyTracker::new();
        tracker.record(rec(1, 70, 70)).unwrap();
        tracker.record(rec(2, 71, 71)).unwrap();
        tracker.record(rec(3, 60, 80)).unwrap();
        assert_eq!(tracker.current(), Strategy::Aggressive);
    }

    #[test]
    fn test_correctness_deficit() {
        let mut tracker = StrategyTracker::new();
        tracker.record(rec(1, 50, 50)).unwrap();
        tracker.record(rec(2, 90, 40)).unwrap();
        assert_eq!(tracker.current(), Strategy::CorrectnessFocus);
    }

    #[test]
    fn test_small_gain_keeps_non_standard_strategy() {
        let mut tracker = StrategyTracker::new();
        tracker.record(rec(1, 50, 50)).unwrap();
        tracker.record(rec(2, 90, 40)).unwrap();
        assert_eq!(tracker.current(), Strategy::CorrectnessFocus);
        // +5 exactly is not a recovery.
        tracker.record(rec(3, 70, 70)).unwrap();
        assert_eq!(tracker.current(), Strategy::CorrectnessFocus);
        tracker.record(rec(4, 80, 80)).unwrap();
        assert_eq!(tracker.current(), Strategy::Standard);
    }

    #[test]
    fn test_window_only_sees_last_five_rounds() {
        let mut tracker = StrategyTracker::new();
        for (round, avg) in [(1, 70), (2, 90), (3, 80), (4, 85), (5, 88), (6, 84), (7, 86)] {
            tracker.record(balanced(round, avg)).unwrap();
        }
        assert_eq!(tracker.window().len(), WINDOW_SIZE);
        assert_eq!(tracker.window()[0].round, 3);
    }

    #[test]
    fn test_out_of_order_round_is_rejected() {
        let mut tracker = StrategyTracker::new();
        tracker.record(balanced(1, 50)).unwrap();
        tracker.record(balanced(2, 55)).unwrap();
        let err = tracker.record(balanced(2, 60)).unwrap_err();
        assert!(matches!(
            err,
            PromptLoopError::RoundOutOfOrder { round: 2, last: 2 }
        ));
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_reset_clears_history_and_strategy() {
        let mut tracker = StrategyTracker::new();
        for (round, avg) in [(1, 80), (2, 70), (3, 60)] {
            tracker.record(balanced(round, avg)).unwrap();
        }
        assert_eq!(tracker.current(), Strategy::Conservative);
        tracker.reset();
        assert_eq!(tracker.current(), Strategy::Standard);
        assert!(tracker.history().is_empty());
        assert_eq!(tracker.last_round(), 0);
    }

    #[test]
    fn test_best_record_prefers_earliest_on_tie() {
        let mut tracker = StrategyTracker::new();
        tracker.record(balanced(1, 60)).unwrap();
        tracker.record(balanced(2, 80)).unwrap();
        tracker.record(balanced(3, 80)).unwrap();
        assert_eq!(tracker.best_record().map(|r| r.round), Some(2));
    }
}
