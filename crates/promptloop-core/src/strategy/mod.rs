//! Evaluation strategies and the history-driven tracker that selects them.
//!
//! # Module layout
//!
//! - [`Strategy`]: the closed set of evaluation policies and their
//!   instruction fragments
//! - [`tracker`]: `StrategyTracker`, `TrendSignals`, `next_strategy`

pub mod tracker;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use tracker::{
    analyze_trend, next_strategy, StrategyTracker, StrategyTransition, TrendSignals,
};

/// The active bias applied to the judge's next evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Standard,
    Conservative,
    Aggressive,
    StabilityFocus,
    CorrectnessFocus,
}

/// Static description of a strategy.
#[derive(Debug)]
pub struct StrategyProfile {
    pub name: &'static str,
    pub description: &'static str,
    /// Prefix for the evaluator's instruction text. Empty means no bias.
    pub instruction: &'static str,
}

const STANDARD: StrategyProfile = StrategyProfile {
    name: "standard",
    description: "Balanced evaluation of stability and correctness.",
    instruction: "",
};

const CONSERVATIVE: StrategyProfile = StrategyProfile {
    name: "conservative",
    description: "Scores have been falling; make small, safe edits to the prompt.",
    instruction: "STRATEGY: CONSERVATIVE. Recent rewrites made the prompt worse. \
Keep everything in the current prompt that already works and propose only small, \
targeted edits. Do not restructure the prompt or change its overall approach.\n\n",
};

const AGGRESSIVE: StrategyProfile = StrategyProfile {
    name: "aggressive",
    description: "Scores have plateaued; try a substantially different prompt.",
    instruction: "STRATEGY: AGGRESSIVE. Scores have stopped improving. \
Propose a substantially different prompt: restructure it, add explicit output \
format rules or worked examples, and question assumptions the current prompt makes.\n\n",
};

const STABILITY_FOCUS: StrategyProfile = StrategyProfile {
    name: "stability_focus",
    description: "Outputs vary too much between runs; tighten consistency.",
    instruction: "STRATEGY: STABILITY FOCUS. Outputs differ too much between runs. \
Judge consistency strictly and rewrite the prompt to pin down format, length and \
wording so that repeated runs produce the same answer.\n\n",
};

const CORRECTNESS_FOCUS: StrategyProfile = StrategyProfile {
    name: "correctness_focus",
    description: "Outputs are consistent but wrong; improve accuracy.",
    instruction: "STRATEGY: CORRECTNESS FOCUS. Outputs are consistent but do not match \
the expected answer. Judge accuracy strictly and rewrite the prompt to steer the \
model toward the expected answer.\n\n",
};

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Standard,
        Strategy::Conservative,
        Strategy::Aggressive,
        Strategy::StabilityFocus,
        Strategy::CorrectnessFocus,
    ];

    pub fn profile(self) -> &'static StrategyProfile {
        match self {
            Strategy::Standard => &STANDARD,
            Strategy::Conservative => &CONSERVATIVE,
            Strategy::Aggressive => &AGGRESSIVE,
            Strategy::StabilityFocus => &STABILITY_FOCUS,
            Strategy::CorrectnessFocus => &CORRECTNESS_FOCUS,
        }
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }

    pub fn description(self) -> &'static str {
        self.profile().description
    }

    pub fn instruction(self) -> &'static str {
        self.profile().instruction
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_has_empty_instruction() {
        assert!(Strategy::Standard.instruction().is_empty());
        assert_eq!(Strategy::default(), Strategy::Standard);
    }

    #[test]
    fn test_non_standard_strategies_bias_the_judge() {
        for strategy in Strategy::ALL.into_iter().filter(|s| *s != Strategy::Standard) {
            assert!(
                !strategy.instruction().is_empty(),
                "{strategy} must carry an instruction"
            );
            assert!(!strategy.description().is_empty());
        }
    }

    #[test]
    fn test_serde_names_match_display() {
        for strategy in Strategy::ALL {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{strategy}\""));
        }
    }
}
