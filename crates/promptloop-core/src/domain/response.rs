//! Single execution outcome.

use serde::{Deserialize, Serialize};

/// One execution of a test case against the model under test.
///
/// `index` is 1-based and unique within a round; it is the ordering key for
/// everything downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub index: u32,
    /// Model output. Empty when the execution failed.
    pub content: String,
    pub elapsed_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn succeeded(index: u32, content: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            index,
            content: content.into(),
            elapsed_ms,
            success: true,
            error: None,
        }
    }

    pub fn failed(index: u32, error: impl Into<String>, elapsed_ms: u64) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            index,
            content: String::new(),
            elapsed_ms,
            success: false,
            error: Some(error),
        }
    }
}

/// Keep only successful responses, preserving order.
pub fn successful(responses: &[AgentResponse]) -> Vec<&AgentResponse> {
    responses.iter().filter(|r| r.success).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_response_has_empty_content_and_error() {
        let r = AgentResponse::failed(2, "connection reset", 120);
        assert!(!r.success);
        assert!(r.content.is_empty());
        assert_eq!(r.error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_failed_response_never_has_blank_error() {
        let r = AgentResponse::failed(1, "", 0);
        assert_eq!(r.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn test_successful_filters_failures() {
        let responses = vec![
            AgentResponse::succeeded(1, "a", 10),
            AgentResponse::failed(2, "boom", 5),
            AgentResponse::succeeded(3, "c", 12),
        ];
        let ok: Vec<u32> = successful(&responses).iter().map(|r| r.index).collect();
        assert_eq!(ok, vec![1, 3]);
    }
}
