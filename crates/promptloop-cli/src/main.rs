//! PromptLoop - adaptive prompt optimization CLI
//!
//! The `promptloop` command runs a system prompt several times in parallel,
//! has a judge model score the outputs and iterates on the prompt.
//!
//! ## Commands
//!
//! - `optimize`: automatic loop, the judge rewrites the prompt each round
//! - `guided`: the operator picks the preferred response style each round
//! - `history`: show stored rounds or prompt versions

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn, Level};
use uuid::Uuid;

use promptloop_core::orchestrator::DEFAULT_PROJECT;
use promptloop_core::{
    CancellationToken, DifferenceAnalysis, FsSessionStore, GuidedSession, ModelClient,
    OpenAiCompatibleClient, Optimizer, PausedRound, PromptLoopConfig, ResumeOutcome,
    SessionReport, SessionStore, TestCase, UserFeedback,
};

#[derive(Parser)]
#[command(name = "promptloop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Adaptive prompt optimization loop", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to a TOML config file
    #[arg(long, global = true, env = "PROMPTLOOP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct CaseArgs {
    /// System prompt to optimize, or @path to read it from a file
    #[arg(short, long)]
    prompt: String,

    /// Question sent as the user message on every run
    #[arg(short, long)]
    question: String,

    /// Expected answer used for the correctness score
    #[arg(short, long)]
    expected: Option<String>,

    /// Parallel runs per round (default from config)
    #[arg(short, long)]
    runs: Option<u32>,

    /// Sampling temperature for the model under test (default from config)
    #[arg(short, long)]
    temperature: Option<f32>,
}

#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// Project name under which prompt versions are stored
    #[arg(long, default_value = DEFAULT_PROJECT)]
    project: String,

    /// Directory for round history and prompt versions (not persisted if omitted)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Write the session report as JSON to this path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automatic loop until the target score or the round budget
    Optimize {
        #[command(flatten)]
        case: CaseArgs,

        /// Round budget (default from config)
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Stop once a round's average score reaches this value (default from config)
        #[arg(long)]
        target: Option<f64>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Run the loop with operator feedback on stdin each round
    Guided {
        #[command(flatten)]
        case: CaseArgs,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show stored rounds of a session or prompt versions of a project
    History {
        /// Store directory used by earlier sessions
        #[arg(long)]
        store_dir: PathBuf,

        /// Session id to list rounds for
        #[arg(long, conflicts_with = "project")]
        session: Option<Uuid>,

        /// Project to list prompt versions for
        #[arg(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    promptloop_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Optimize {
            case,
            max_rounds,
            target,
            session,
        } => cmd_optimize(config, &case, max_rounds, target, &session).await,
        Commands::Guided { case, session } => cmd_guided(config, &case, &session).await,
        Commands::History {
            store_dir,
            session,
            project,
        } => cmd_history(&store_dir, session, project.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<PromptLoopConfig> {
    let config = match path {
        Some(path) => PromptLoopConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PromptLoopConfig::default(),
    };
    config.validate().context("Invalid config")?;
    Ok(config)
}

/// Read `@path` arguments from disk; anything else is taken literally.
fn resolve_text(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map(|s| s.trim_end().to_string())
            .with_context(|| format!("Failed to read prompt file {path}")),
        None => Ok(arg.to_string()),
    }
}

fn build_case(config: &PromptLoopConfig, args: &CaseArgs) -> Result<TestCase> {
    let mut case = TestCase::new(resolve_text(&args.prompt)?, &args.question)
        .with_execution_count(args.runs.unwrap_or(config.defaults.execution_count))
        .with_temperature(args.temperature.unwrap_or(config.defaults.temperature));
    if let Some(expected) = &args.expected {
        case = case.with_expected_answer(expected);
    }
    case.validate().context("Invalid test case")?;
    Ok(case)
}

fn build_clients(
    config: &PromptLoopConfig,
) -> Result<(Arc<dyn ModelClient>, Arc<dyn ModelClient>)> {
    let target = OpenAiCompatibleClient::from_endpoint(&config.target)
        .context("Failed to configure target model")?;
    let judge = OpenAiCompatibleClient::from_endpoint(config.judge_endpoint())
        .context("Failed to configure judge model")?;
    info!(
        target_model = %config.target.model,
        judge_model = %config.judge_endpoint().model,
        "model clients ready"
    );
    Ok((Arc::new(target), Arc::new(judge)))
}

fn open_store(dir: Option<&Path>) -> Result<Option<Arc<dyn SessionStore>>> {
    dir.map(|dir| {
        FsSessionStore::new(dir)
            .map(|store| Arc::new(store) as Arc<dyn SessionStore>)
            .with_context(|| format!("Failed to open store at {}", dir.display()))
    })
    .transpose()
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling session");
            child.cancel();
        }
    });
    token
}

async fn cmd_optimize(
    mut config: PromptLoopConfig,
    case_args: &CaseArgs,
    max_rounds: Option<u32>,
    target: Option<f64>,
    session_args: &SessionArgs,
) -> Result<()> {
    if let Some(max_rounds) = max_rounds {
        config.optimizer.max_rounds = max_rounds;
    }
    if let Some(target) = target {
        config.optimizer.target_score = target;
    }
    config.validate().context("Invalid optimizer settings")?;

    let case = build_case(&config, case_args)?;
    let (target_model, judge_model) = build_clients(&config)?;

    let mut optimizer = Optimizer::new(target_model, judge_model, config.optimizer.clone())
        .with_project(&session_args.project);
    if let Some(store) = open_store(session_args.store_dir.as_deref())? {
        optimizer = optimizer.with_store(store);
    }

    let cancel = cancel_on_ctrl_c();
    let report = optimizer.run(case, &cancel).await?;

    print_report(&report);
    write_report(&report, session_args.output.as_deref())?;
    promptloop_core::metrics::METRICS.flush();

    if report.stop_reason.is_failure() {
        bail!("session stopped: {}", report.stop_reason);
    }
    Ok(())
}

async fn cmd_guided(
    config: PromptLoopConfig,
    case_args: &CaseArgs,
    session_args: &SessionArgs,
) -> Result<()> {
    let case = build_case(&config, case_args)?;
    let (target_model, judge_model) = build_clients(&config)?;

    let mut session =
        GuidedSession::new(target_model, judge_model, case)?.with_project(&session_args.project);
    if let Some(store) = open_store(session_args.store_dir.as_deref())? {
        session = session.with_store(store);
    }
    println!("Session {}", session.session_id());

    let cancel = cancel_on_ctrl_c();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    'session: loop {
        let paused = match session.begin_round(&cancel).await {
            Ok(paused) => paused.clone(),
            Err(e) => {
                eprintln!("Round failed: {e}");
                break;
            }
        };
        print_paused(&paused);

        loop {
            prompt_line("feedback> ").await?;
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read stdin")?,
                _ = cancel.cancelled() => None,
            };
            let Some(line) = line else {
                break 'session;
            };

            let feedback = match parse_feedback(&line, &paused.analysis) {
                FeedbackCommand::Quit => break 'session,
                FeedbackCommand::Invalid(message) => {
                    println!("{message}");
                    continue;
                }
                FeedbackCommand::Feedback(feedback) => feedback,
            };

            match session.resume(feedback, &cancel).await {
                Ok(ResumeOutcome::NoFeedback) => {
                    println!("No feedback given; pick a style, add text, or type q to finish.");
                }
                Ok(ResumeOutcome::Applied {
                    rewrite,
                    transition,
                }) => {
                    println!("\nNew prompt:\n{}\n", rewrite.optimized_prompt);
                    if let Some(changes) = &rewrite.changes {
                        println!("Changes: {changes}");
                    }
                    if transition.changed() {
                        println!("Strategy: {} -> {}", transition.from, transition.to);
                    }
                    break;
                }
                Err(e) => {
                    eprintln!("Rewrite failed: {e}");
                    break 'session;
                }
            }
        }
    }

    let report = session.finish().await;
    print_report(&report);
    write_report(&report, session_args.output.as_deref())?;
    promptloop_core::metrics::METRICS.flush();
    Ok(())
}

async fn prompt_line(text: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// One line of operator input during a guided pause.
#[derive(Debug, PartialEq)]
enum FeedbackCommand {
    Quit,
    Feedback(UserFeedback),
    Invalid(String),
}

/// Parse operator input:
///
/// - `q` / `quit`: end the session
/// - `<n>`: prefer cluster number `n`
/// - `<n> <text>`: prefer cluster `n` with extra feedback
/// - `c <text>` or any other text: custom feedback only
/// - empty line: no feedback
fn parse_feedback(line: &str, analysis: &DifferenceAnalysis) -> FeedbackCommand {
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
        return FeedbackCommand::Quit;
    }
    if let Some(text) = line.strip_prefix("c ") {
        return FeedbackCommand::Feedback(UserFeedback::text(text.trim()));
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let Ok(number) = head.parse::<usize>() else {
        return FeedbackCommand::Feedback(UserFeedback::text(line));
    };
    let Some(cluster) = number
        .checked_sub(1)
        .and_then(|i| analysis.clusters.get(i))
    else {
        return FeedbackCommand::Invalid(format!(
            "No style {number}; choose 1-{}.",
            analysis.clusters.len()
        ));
    };

    let feedback = UserFeedback::cluster(&cluster.name);
    if rest.is_empty() {
        FeedbackCommand::Feedback(feedback)
    } else {
        FeedbackCommand::Feedback(feedback.with_text(rest))
    }
}

fn print_paused(paused: &PausedRound) {
    let eval = &paused.evaluation;
    let failed = paused.responses.iter().filter(|r| !r.success).count();
    println!();
    println!(
        "Round {} [{}]  stability {}  correctness {}  ({} runs, {} failed)",
        paused.round,
        paused.strategy,
        eval.stability_score,
        eval.correctness_score,
        paused.responses.len(),
        failed
    );
    if !paused.analysis.summary.is_empty() {
        println!("{}", paused.analysis.summary);
    }
    println!();
    for (i, cluster) in paused.analysis.clusters.iter().enumerate() {
        println!(
            "  {}. {} (runs {:?})",
            i + 1,
            cluster.name,
            cluster.response_indices
        );
        if !cluster.description.is_empty() {
            println!("     {}", cluster.description);
        }
        println!("     > {}", cluster.preview);
    }
    for direction in &paused.analysis.suggested_directions {
        println!("  - {direction}");
    }
    println!();
    println!("Enter a style number, `<n> <text>`, `c <text>`, or q to finish.");
}

fn print_report(report: &SessionReport) {
    println!();
    println!("Session {} stopped: {}", report.session_id, report.stop_reason);
    for round in &report.rounds {
        let r = &round.record;
        println!(
            "  round {:>2}  [{}]  stability {:>3}  correctness {:>3}  avg {:>5.1}{}",
            r.round,
            round.strategy,
            r.stability_score,
            r.correctness_score,
            r.average_score,
            if r.prompt_changed() { "  *rewritten" } else { "" }
        );
    }
    if let Some(best) = &report.best_round {
        println!("Best round: {} (avg {:.1})", best.round, best.average_score);
    }
    println!("Final strategy: {}", report.final_strategy);
    println!("\nFinal prompt:\n{}", report.final_prompt);
}

fn write_report(report: &SessionReport, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}

async fn cmd_history(store_dir: &Path, session: Option<Uuid>, project: Option<&str>) -> Result<()> {
    let store = FsSessionStore::new(store_dir)
        .with_context(|| format!("Failed to open store at {}", store_dir.display()))?;

    match (session, project) {
        (Some(session), _) => {
            let records = store.records(session).await?;
            if records.is_empty() {
                println!("No rounds stored for session {session}");
                return Ok(());
            }
            for r in records {
                println!(
                    "round {:>2}  {}  stability {:>3}  correctness {:>3}  avg {:>5.1}",
                    r.round,
                    r.recorded_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    r.stability_score,
                    r.correctness_score,
                    r.average_score
                );
            }
        }
        (None, Some(project)) => {
            let versions = store.prompt_versions(project).await?;
            if versions.is_empty() {
                println!("No prompt versions stored for project '{project}'");
                return Ok(());
            }
            for v in versions {
                let score = v
                    .average_score
                    .map(|s| format!("{s:.1}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  round {:>2}  avg {:>5}  {}",
                    v.short_digest(),
                    v.round,
                    score,
                    v.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!("    {}", v.prompt.replace('\n', "\n    "));
            }
        }
        (None, None) => bail!("history needs --session or --project"),
    }
    Ok(())
}
