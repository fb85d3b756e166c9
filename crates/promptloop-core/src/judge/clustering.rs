//! Difference clustering: partitions successful responses into style groups.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::parse::{lenient_string_list, parse_lenient};
use super::prompts::{clustering_request, CLUSTERING_INSTRUCTIONS};
use super::{call_judge, preview};
use crate::domain::{
    successful, AgentResponse, DifferenceAnalysis, ResponseCluster, Result, TestCase,
};
use crate::metrics::METRICS;
use crate::model::ModelClient;
use crate::obs;

/// Maximum preview length in characters.
pub const PREVIEW_CHARS: usize = 100;

const FALLBACK_CLUSTER_NAME: &str = "All responses";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterVerdict {
    #[serde(default)]
    clusters: Vec<ClusterEntry>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    suggested_directions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "indices")]
    response_indices: Vec<u32>,
}

/// Asks the judge to group responses by style (guided mode).
#[derive(Clone)]
pub struct ClusteringAnalyzer {
    judge: Arc<dyn ModelClient>,
}

impl ClusteringAnalyzer {
    pub fn new(judge: Arc<dyn ModelClient>) -> Self {
        Self { judge }
    }

    /// Cluster the successful responses of a round.
    ///
    /// Failed runs are neither sent to the judge nor placed in any cluster.
    /// With no successful responses there is nothing to compare and no call
    /// is made.
    #[instrument(skip_all, fields(runs = responses.len()))]
    pub async fn analyze(
        &self,
        case: &TestCase,
        responses: &[AgentResponse],
        cancel: &CancellationToken,
    ) -> Result<DifferenceAnalysis> {
        let ok = successful(responses);
        if ok.is_empty() {
            return Ok(DifferenceAnalysis {
                clusters: Vec::new(),
                summary: "No successful responses to compare.".to_string(),
                suggested_directions: Vec::new(),
            });
        }

        let reply = call_judge(
            self.judge.as_ref(),
            CLUSTERING_INSTRUCTIONS,
            clustering_request(case, &ok),
            cancel,
        )
        .await?;
        Ok(parse_analysis(&reply, &ok))
    }
}

/// Decode a clustering reply against the responses that were sent.
pub fn parse_analysis(reply: &str, responses: &[&AgentResponse]) -> DifferenceAnalysis {
    let verdict = match parse_lenient::<ClusterVerdict>(reply) {
        Ok(verdict) => verdict,
        Err(e) => {
            METRICS.inc_judge_fallbacks();
            obs::emit_judge_fallback("clustering", &e);
            return fallback_analysis(responses, &format!("Clustering unavailable: {e}"));
        }
    };

    let contents: BTreeMap<u32, &str> = responses
        .iter()
        .map(|r| (r.index, r.content.as_str()))
        .collect();
    let mut claimed = HashSet::new();

    let clusters: Vec<ResponseCluster> = verdict
        .clusters
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            // Unknown (failed or invented) indices are dropped; an index
            // belongs to the first cluster that lists it.
            let indices: Vec<u32> = entry
                .response_indices
                .into_iter()
                .filter(|idx| contents.contains_key(idx) && claimed.insert(*idx))
                .collect();
            let first = *indices.first()?;
            let name = if entry.name.trim().is_empty() {
                format!("Style {}", i + 1)
            } else {
                entry.name.trim().to_string()
            };
            Some(ResponseCluster {
                name,
                description: entry.description,
                preview: preview(contents[&first], PREVIEW_CHARS),
                response_indices: indices,
            })
        })
        .collect();

    if clusters.is_empty() {
        METRICS.inc_judge_fallbacks();
        obs::emit_judge_fallback("clustering", &"verdict contained no usable clusters");
        return fallback_analysis(responses, "Clustering unavailable: no usable clusters.");
    }

    DifferenceAnalysis {
        clusters,
        summary: verdict.summary.unwrap_or_default(),
        suggested_directions: verdict.suggested_directions,
    }
}

/// One catch-all cluster holding every response.
pub fn fallback_analysis(responses: &[&AgentResponse], summary: &str) -> DifferenceAnalysis {
    let indices: Vec<u32> = responses.iter().map(|r| r.index).collect();
    let preview_text = responses
        .first()
        .map(|r| preview(&r.content, PREVIEW_CHARS))
        .unwrap_or_default();

    DifferenceAnalysis {
        clusters: vec![ResponseCluster {
            name: FALLBACK_CLUSTER_NAME.to_string(),
            description: "All successful responses grouped together.".to_string(),
            response_indices: indices,
            preview: preview_text,
        }],
        summary: summary.to_string(),
        suggested_directions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses() -> Vec<AgentResponse> {
        vec![
            AgentResponse::succeeded(1, "4", 10),
            AgentResponse::succeeded(2, "The answer is 4 because two plus two is four.", 12),
            AgentResponse::failed(3, "timeout", 30),
        ]
    }

    #[test]
    fn test_clusters_use_first_index_preview() {
        let all = responses();
        let ok = successful(&all);
        let reply = r#"{"clusters": [
            {"name": "Terse", "description": "bare number", "responseIndices": [1]},
            {"name": "Explained", "description": "with reasoning", "responseIndices": [2]}
        ], "summary": "two styles", "suggestedDirections": ["pick one"]}"#;

        let analysis = parse_analysis(reply, &ok);
        assert_eq!(analysis.clusters.len(), 2);
        assert_eq!(analysis.clusters[0].preview, "4");
        assert_eq!(analysis.clusters[1].response_indices, vec![2]);
        assert_eq!(analysis.summary, "two styles");
        assert_eq!(analysis.suggested_directions, vec!["pick one".to_string()]);
    }

    #[test]
    fn test_failed_and_duplicate_indices_are_dropped() {
        let all = responses();
        let ok = successful(&all);
        let reply = r#"{"clusters": [
            {"name": "A", "description": "", "responseIndices": [1, 3, 9]},
            {"name": "B", "description": "", "responseIndices": [1, 2]}
        ]}"#;

        let analysis = parse_analysis(reply, &ok);
        assert_eq!(analysis.clusters[0].response_indices, vec![1]);
        assert_eq!(analysis.clusters[1].response_indices, vec![2]);
    }

    #[test]
    fn test_unparseable_reply_yields_single_cluster() {
        let all = responses();
        let ok = successful(&all);
        let analysis = parse_analysis("they all look similar", &ok);

        assert_eq!(analysis.clusters.len(), 1);
        assert_eq!(analysis.clusters[0].name, FALLBACK_CLUSTER_NAME);
        assert_eq!(analysis.clusters[0].response_indices, vec![1, 2]);
        assert!(analysis.suggested_directions.is_empty());
    }

    #[test]
    fn test_verdict_with_only_unknown_indices_falls_back() {
        let all = responses();
        let ok = successful(&all);
        let analysis = parse_analysis(r#"{"clusters": [{"name": "X", "responseIndices": [3]}]}"#, &ok);
        assert_eq!(analysis.clusters[0].name, FALLBACK_CLUSTER_NAME);
    }

    #[test]
    fn test_long_preview_is_truncated() {
        let long = AgentResponse::succeeded(1, "x".repeat(250), 1);
        let analysis = fallback_analysis(&[&long], "");
        assert_eq!(analysis.clusters[0].preview.len(), PREVIEW_CHARS + 3);
        assert!(analysis.clusters[0].preview.ends_with("..."));
    }
}
