//! Guided-mode artifacts: response clusters and operator feedback.

use serde::{Deserialize, Serialize};

/// A group of responses sharing a style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCluster {
    pub name: String,
    pub description: String,
    /// 1-based response indices, successful runs only.
    pub response_indices: Vec<u32>,
    /// Truncated content of the first listed response.
    pub preview: String,
}

/// Result of clustering one round's responses. Regenerated every round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferenceAnalysis {
    pub clusters: Vec<ResponseCluster>,
    pub summary: String,
    pub suggested_directions: Vec<String>,
}

impl DifferenceAnalysis {
    pub fn cluster(&self, name: &str) -> Option<&ResponseCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

/// Operator input for one guided round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFeedback {
    #[serde(default)]
    pub selected_cluster: Option<String>,
    #[serde(default)]
    pub custom_text: Option<String>,
}

impl UserFeedback {
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            selected_cluster: Some(name.into()),
            custom_text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            selected_cluster: None,
            custom_text: Some(text.into()),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.custom_text = Some(text.into());
        self
    }

    /// Selected cluster, if non-blank.
    pub fn selected(&self) -> Option<&str> {
        non_blank(self.selected_cluster.as_deref())
    }

    /// Free-text feedback, if non-blank.
    pub fn custom(&self) -> Option<&str> {
        non_blank(self.custom_text.as_deref())
    }

    /// True iff either field carries a non-blank value.
    pub fn has_feedback(&self) -> bool {
        self.selected().is_some() || self.custom().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_feedback_has_no_signal() {
        assert!(!UserFeedback::default().has_feedback());
        let blank = UserFeedback {
            selected_cluster: Some("   ".into()),
            custom_text: Some("\n".into()),
        };
        assert!(!blank.has_feedback());
    }

    #[test]
    fn test_either_field_counts_as_feedback() {
        assert!(UserFeedback::cluster("Concise").has_feedback());
        assert!(UserFeedback::text("shorter please").has_feedback());
        assert_eq!(UserFeedback::text("  shorter ").custom(), Some("shorter"));
    }
}
