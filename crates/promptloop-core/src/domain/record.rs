//! Round records and the judge's verdict for a round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Neutral score used whenever the judge's verdict cannot be read.
pub const NEUTRAL_SCORE: u8 = 50;

/// Clamp a judge-reported score into `0..=100`, rounding to the nearest integer.
pub fn clamp_score(raw: f64) -> u8 {
    if !raw.is_finite() {
        return NEUTRAL_SCORE;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Mean of the two score axes.
pub fn average_score(stability: u8, correctness: u8) -> f64 {
    (f64::from(stability) + f64::from(correctness)) / 2.0
}

/// The judge's verdict on one response set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub stability_score: u8,
    pub correctness_score: u8,
    pub report: String,
    pub suggestions: Vec<String>,
    /// Candidate prompt for the next round.
    pub optimized_prompt: String,
    /// True when the verdict came from the parse-failure fallback.
    #[serde(default)]
    pub fallback: bool,
}

impl Evaluation {
    pub fn average_score(&self) -> f64 {
        average_score(self.stability_score, self.correctness_score)
    }
}

/// One round's outcome in the optimization history.
///
/// Records are append-only; round numbers are 1-based and strictly increasing
/// within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub round: u32,
    pub stability_score: u8,
    pub correctness_score: u8,
    pub average_score: f64,
    pub prompt_before: String,
    pub prompt_after: String,
    pub recorded_at: DateTime<Utc>,
}

impl EvaluationRecord {
    pub fn new(
        round: u32,
        stability_score: u8,
        correctness_score: u8,
        prompt_before: impl Into<String>,
        prompt_after: impl Into<String>,
    ) -> Self {
        Self {
            round,
            stability_score,
            correctness_score,
            average_score: average_score(stability_score, correctness_score),
            prompt_before: prompt_before.into(),
            prompt_after: prompt_after.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Whether this round changed the prompt.
    pub fn prompt_changed(&self) -> bool {
        self.prompt_before != self.prompt_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-5.0), 0);
        assert_eq!(clamp_score(150.0), 100);
        assert_eq!(clamp_score(72.6), 73);
        assert_eq!(clamp_score(f64::NAN), NEUTRAL_SCORE);
    }

    #[test]
    fn test_record_derives_average() {
        let record = EvaluationRecord::new(1, 40, 61, "a", "b");
        assert_eq!(record.average_score, 50.5);
        assert!(record.prompt_changed());
    }
}
