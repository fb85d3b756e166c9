//! Instruction texts and request builders for judge calls.

use std::fmt::Write;

use crate::domain::{AgentResponse, DifferenceAnalysis, TestCase, UserFeedback};

pub const EVALUATOR_INSTRUCTIONS: &str = r#"You are an expert prompt engineer evaluating how well a system prompt performs.
The same prompt and question were sent to a model several times. Judge the full set of outputs.

Score two axes from 0 to 100:
- stabilityScore: how consistent the outputs are with each other in content, format and length.
  Identical outputs score 100.
- correctnessScore: how well the outputs match the expected answer. If no expected answer is
  given, judge whether the outputs correctly and fully answer the question.

Then propose an improved system prompt that would raise both scores.

Reply with a single JSON object and nothing else:
{
  "stabilityScore": <integer 0-100>,
  "correctnessScore": <integer 0-100>,
  "evaluationReport": "<short analysis of the outputs>",
  "suggestions": ["<concrete improvement>", "..."],
  "optimizedPrompt": "<the complete rewritten system prompt>"
}"#;

pub const CLUSTERING_INSTRUCTIONS: &str = r#"You are analysing the style of several model outputs produced from the same prompt.
Group the outputs into 2 or 3 clusters of similar style (tone, structure, length, level of detail).
Every output index must appear in exactly one cluster. Use only the indices you were given.

Reply with a single JSON object and nothing else:
{
  "clusters": [
    {"name": "<short style name>", "description": "<what these outputs have in common>", "responseIndices": [1, 2]}
  ],
  "summary": "<how the clusters differ>",
  "suggestedDirections": ["<a direction the prompt could be steered in>", "..."]
}"#;

pub const REWRITE_INSTRUCTIONS: &str = r#"You are an expert prompt engineer. Rewrite the system prompt so that future outputs
follow the user's feedback. Keep what the feedback does not ask to change.

Reply with a single JSON object and nothing else:
{
  "optimizedPrompt": "<the complete rewritten system prompt>",
  "changes": "<one or two sentences describing what changed>"
}"#;

fn push_case_header(out: &mut String, case: &TestCase) {
    let _ = writeln!(out, "## System prompt\n{}\n", case.system_prompt);
    let _ = writeln!(out, "## Question\n{}\n", case.question);
}

fn push_expected(out: &mut String, case: &TestCase) {
    if case.has_expected_answer() {
        let _ = writeln!(out, "## Expected answer\n{}\n", case.expected_answer);
    } else {
        out.push_str("## Expected answer\n(none given)\n\n");
    }
}

/// User turn for the evaluator: the case plus every response with timing.
pub fn evaluation_request(case: &TestCase, responses: &[AgentResponse]) -> String {
    let mut out = String::new();
    push_case_header(&mut out, case);
    push_expected(&mut out, case);

    let failed = responses.iter().filter(|r| !r.success).count();
    let _ = writeln!(
        out,
        "## Outputs ({} runs, {} failed, temperature {})\n",
        responses.len(),
        failed,
        case.temperature
    );
    for r in responses {
        if r.success {
            let _ = writeln!(out, "### Run {} ({} ms)\n{}\n", r.index, r.elapsed_ms, r.content);
        } else {
            let _ = writeln!(
                out,
                "### Run {} ({} ms) FAILED\n{}\n",
                r.index,
                r.elapsed_ms,
                r.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    out
}

/// User turn for the clustering analyzer. Only successful responses are sent.
pub fn clustering_request(case: &TestCase, responses: &[&AgentResponse]) -> String {
    let mut out = String::new();
    push_case_header(&mut out, case);

    let indices: Vec<String> = responses.iter().map(|r| r.index.to_string()).collect();
    let _ = writeln!(out, "## Outputs (indices: {})\n", indices.join(", "));
    for r in responses {
        let _ = writeln!(out, "### Output {}\n{}\n", r.index, r.content);
    }
    out
}

/// User turn for the feedback rewriter.
pub fn rewrite_request(
    case: &TestCase,
    samples: &[&AgentResponse],
    feedback: &UserFeedback,
    analysis: Option<&DifferenceAnalysis>,
) -> String {
    let mut out = String::new();
    push_case_header(&mut out, case);

    if !samples.is_empty() {
        out.push_str("## Sample outputs from the current prompt\n\n");
        for r in samples {
            let _ = writeln!(out, "### Output {}\n{}\n", r.index, r.content);
        }
    }

    out.push_str("## User feedback\n");
    if let Some(name) = feedback.selected() {
        let _ = writeln!(out, "Preferred style: {name}");
        if let Some(cluster) = analysis.and_then(|a| a.cluster(name)) {
            let _ = writeln!(out, "Style description: {}", cluster.description);
            let _ = writeln!(out, "Example of the preferred style: {}", cluster.preview);
        }
    }
    if let Some(text) = feedback.custom() {
        let _ = writeln!(out, "Additional feedback: {text}");
    }
    out
}
