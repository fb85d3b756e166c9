//! End-to-end sessions over fake models.

use std::sync::Arc;
use std::time::Duration;

use promptloop_core::model::fakes::{CannedModel, ScriptedModel};
use promptloop_core::{
    run_parallel, CancellationToken, FsSessionStore, GuidedSession, OptimizerConfig,
    Optimizer, ResponseEvaluator, ResumeOutcome, SessionState, SessionStore, StopReason,
    Strategy, TestCase, UserFeedback,
};

fn arithmetic_case() -> TestCase {
    TestCase::new("Answer tersely", "2+2?")
        .with_expected_answer("4")
        .with_execution_count(3)
}

#[tokio::test]
async fn identical_correct_outputs_score_full_marks() {
    let target = Arc::new(CannedModel::new("4"));
    let judge = Arc::new(ScriptedModel::new([r#"{"stabilityScore": 100, "correctnessScore": 100,
        "evaluationReport": "All three runs answered 4.", "suggestions": [],
        "optimizedPrompt": "Answer tersely"}"#]));
    let cancel = CancellationToken::new();
    let case = arithmetic_case();

    let responses = run_parallel(target.clone(), &case, &cancel).await.unwrap();
    assert_eq!(responses.len(), 3);
    assert!(responses.iter().all(|r| r.success && r.content == "4"));

    let eval = ResponseEvaluator::new(judge.clone())
        .evaluate(&case, &responses, Strategy::Standard, &cancel)
        .await
        .unwrap();

    assert_eq!(eval.stability_score, 100);
    assert!(eval.correctness_score >= 95);

    let sent = &judge.requests()[0].user_message;
    for i in 1..=3 {
        assert!(sent.contains(&format!("### Run {i}")));
    }
    assert!(sent.contains("4"));
}

#[tokio::test]
async fn automatic_session_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsSessionStore::new(dir.path()).unwrap());
    let judge = ScriptedModel::new([
        r#"{"stabilityScore": 70, "correctnessScore": 80, "optimizedPrompt": "Answer with one number."}"#,
        r#"{"stabilityScore": 95, "correctnessScore": 100, "optimizedPrompt": "Answer with one number."}"#,
    ]);
    let optimizer = Optimizer::new(
        Arc::new(CannedModel::new("4")),
        Arc::new(judge),
        OptimizerConfig {
            max_rounds: 5,
            target_score: 90.0,
        },
    )
    .with_project("arithmetic")
    .with_store(store.clone());

    let report = optimizer
        .run(arithmetic_case(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.stop_reason, StopReason::TargetReached);

    let reopened = FsSessionStore::new(dir.path()).unwrap();
    let records = reopened.records(report.session_id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].prompt_before, "Answer tersely");
    assert_eq!(records[1].prompt_before, "Answer with one number.");

    let versions = reopened.prompt_versions("arithmetic").await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].round, 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stop_reason"]["kind"], "target_reached");
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_round_keeps_only_completed_rounds() {
    // Round 1 completes quickly; round 2's executions hang until cancelled.
    let mut delays = vec![Duration::ZERO; 3];
    delays.extend(vec![Duration::from_secs(300); 3]);
    let target = Arc::new(CannedModel::new("4").with_delays(delays));
    let judge = ScriptedModel::new([r#"{"stabilityScore": 50, "correctnessScore": 50}"#]);
    let optimizer = Optimizer::new(
        target,
        Arc::new(judge),
        OptimizerConfig {
            max_rounds: 5,
            target_score: 90.0,
        },
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let report = optimizer.run(arithmetic_case(), &cancel).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.rounds[0].record.round, 1);
}

#[tokio::test]
async fn guided_session_ignores_empty_feedback_then_applies_choice() {
    let judge = Arc::new(ScriptedModel::new([
        r#"{"stabilityScore": 40, "correctnessScore": 90}"#,
        r#"{"clusters": [{"name": "Bare", "description": "just the number", "responseIndices": [1, 2, 3]}]}"#,
        r#"{"optimizedPrompt": "Reply with only the number.", "changes": "pinned format"}"#,
    ]));
    let mut session =
        GuidedSession::new(Arc::new(CannedModel::new("4")), judge.clone(), arithmetic_case())
            .unwrap()
            .with_project("arithmetic");
    let cancel = CancellationToken::new();

    let paused = session.begin_round(&cancel).await.unwrap();
    assert_eq!(paused.analysis.clusters.len(), 1);
    assert_eq!(session.state(), &SessionState::AwaitingFeedback);

    let noop = session.resume(UserFeedback::default(), &cancel).await.unwrap();
    assert!(matches!(noop, ResumeOutcome::NoFeedback));
    assert_eq!(judge.requests().len(), 2);

    let applied = session
        .resume(UserFeedback::cluster("Bare").with_text("no punctuation"), &cancel)
        .await
        .unwrap();
    assert!(matches!(applied, ResumeOutcome::Applied { .. }));
    assert_eq!(judge.requests().len(), 3);

    let report = session.finish().await;
    assert_eq!(report.stop_reason, StopReason::GuidedExit);
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.final_prompt, "Reply with only the number.");
    let guidance = report.rounds[0].guidance.as_ref().unwrap();
    assert_eq!(guidance.changes.as_deref(), Some("pinned format"));
}
