//! Judge components against malformed and partial replies.

use std::sync::Arc;

use promptloop_core::model::fakes::ScriptedModel;
use promptloop_core::{
    AgentResponse, CancellationToken, ClusteringAnalyzer, FeedbackRewriter, ResponseEvaluator,
    Strategy, TestCase, UserFeedback,
};

fn case() -> TestCase {
    TestCase::new("Answer tersely", "2+2?").with_expected_answer("4")
}

fn mixed_responses() -> Vec<AgentResponse> {
    vec![
        AgentResponse::succeeded(1, "4", 100),
        AgentResponse::failed(2, "HTTP 503: upstream unavailable", 2000),
        AgentResponse::succeeded(3, "Four.", 120),
    ]
}

#[tokio::test]
async fn evaluator_falls_back_on_braceless_replies() {
    for reply in [
        "The outputs look consistent.",
        "",
        "score: 90/100, very stable",
    ] {
        let judge = Arc::new(ScriptedModel::new([reply]));
        let evaluator = ResponseEvaluator::new(judge);
        let eval = evaluator
            .evaluate(&case(), &mixed_responses(), Strategy::Standard, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(eval.stability_score, 50, "reply: {reply:?}");
        assert_eq!(eval.correctness_score, 50, "reply: {reply:?}");
        assert!(!eval.suggestions.is_empty());
        assert!(eval.suggestions.iter().all(|s| !s.is_empty()));
        assert_eq!(eval.optimized_prompt, "Answer tersely");
    }
}

#[tokio::test]
async fn evaluator_reads_json_embedded_in_prose() {
    let reply = r#"Here is my verdict:
{"stabilityScore": "85", "correctnessScore": 70, "evaluationReport": "one run failed; {brace} in text",
 "suggestions": "state the format", "optimizedPrompt": "Answer with a single number."}
Let me know if you need more."#;
    let evaluator = ResponseEvaluator::new(Arc::new(ScriptedModel::new([reply])));

    let eval = evaluator
        .evaluate(&case(), &mixed_responses(), Strategy::Standard, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!eval.fallback);
    assert_eq!(eval.stability_score, 85);
    assert_eq!(eval.correctness_score, 70);
    assert_eq!(eval.suggestions, vec!["state the format".to_string()]);
    assert_eq!(eval.optimized_prompt, "Answer with a single number.");
}

#[tokio::test]
async fn clustering_never_sees_failed_runs() {
    let judge = Arc::new(ScriptedModel::new([r#"{"clusters": [
        {"name": "Digits", "description": "numeric", "responseIndices": [1, 2]},
        {"name": "Words", "description": "spelled out", "responseIndices": [3]}
    ], "summary": "two styles"}"#]));
    let analyzer = ClusteringAnalyzer::new(judge.clone());

    let analysis = analyzer
        .analyze(&case(), &mixed_responses(), &CancellationToken::new())
        .await
        .unwrap();

    let sent = &judge.requests()[0].user_message;
    assert!(!sent.contains("upstream unavailable"));

    let all_indices: Vec<u32> = analysis
        .clusters
        .iter()
        .flat_map(|c| c.response_indices.iter().copied())
        .collect();
    assert!(!all_indices.contains(&2));
    assert_eq!(analysis.clusters[0].response_indices, vec![1]);
    assert_eq!(analysis.clusters[1].preview, "Four.");
}

#[tokio::test]
async fn clustering_with_only_failures_makes_no_call() {
    let judge = Arc::new(ScriptedModel::new(["{}"]));
    let analyzer = ClusteringAnalyzer::new(judge.clone());
    let responses = vec![AgentResponse::failed(1, "timeout", 30_000)];

    let analysis = analyzer
        .analyze(&case(), &responses, &CancellationToken::new())
        .await
        .unwrap();

    assert!(analysis.clusters.is_empty());
    assert!(judge.requests().is_empty());
}

#[tokio::test]
async fn rewriter_keeps_prompt_on_unparseable_reply() {
    let rewriter = FeedbackRewriter::new(Arc::new(ScriptedModel::new([
        "I would make it shorter.",
    ])));

    let rewrite = rewriter
        .rewrite(
            &case(),
            &mixed_responses(),
            &UserFeedback::text("shorter please"),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(rewrite.fallback);
    assert_eq!(rewrite.optimized_prompt, "Answer tersely");
}
