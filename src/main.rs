//! CLI entry point (spec.md §6). Parses flags, assembles a [`Runner`] out
//! of the provider/budget/schema configs, drives golden tasks or raw
//! prompts through it, and maps the outcome to the process exit code.

mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use llm_runner::budget::BudgetManager;
use llm_runner::clock::RealClock;
use llm_runner::config::{AggregateKind, BackoffPolicy, BudgetBook, ExecutionMode, ProviderConfig, RunnerConfig};
use llm_runner::executor::{AttemptResult, FailureSummary};
use llm_runner::golden;
use llm_runner::metrics::logger::{CompositeLogger, EventLogger, JsonlLogger, MemoryLogger};
use llm_runner::provider::{registry, ProviderRequest};
use llm_runner::runner::{Runner, RunnerProvider};
use llm_runner::schema::Schema;

const EXIT_OK: i32 = 0;
const EXIT_INPUT_ERROR: i32 = 2;
const EXIT_ENV_ERROR: i32 = 3;
const EXIT_NETWORK: i32 = 4;
const EXIT_PROVIDER_ERROR: i32 = 5;
const EXIT_RATE_LIMIT: i32 = 6;
const EXIT_INTERRUPT: i32 = 130;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    init_tracing(&args.log_level);

    let exit_code = tokio::select! {
        result = run(args) => match result {
            Ok(()) => EXIT_OK,
            Err(err) => {
                tracing::error!(error = %err, "run failed");
                exit_code_for(&err)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted");
            EXIT_INTERRUPT
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Error classes the CLI distinguishes for exit-code mapping. `anyhow`
/// already loses enum identity by the time it reaches `main`, so load
/// failures are tagged at the point of construction via
/// [`CliError::classify`] rather than downcast afterward.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    Env(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Input(_) => EXIT_INPUT_ERROR,
            CliError::Env(_) => EXIT_ENV_ERROR,
            CliError::Other(inner) => exit_code_for(inner),
        };
    }
    if let Some(runner_err) = err.downcast_ref::<llm_runner::error::RunnerError>() {
        return exit_code_for_runner_error(runner_err);
    }
    EXIT_PROVIDER_ERROR
}

fn exit_code_for_runner_error(err: &llm_runner::error::RunnerError) -> i32 {
    use llm_runner::error::RunnerError;
    match err {
        RunnerError::Config(_) | RunnerError::MissingProviderWeights | RunnerError::MissingJudgeProvider | RunnerError::UnknownWeightedProvider(_) => {
            EXIT_INPUT_ERROR
        }
        RunnerError::AllFailed(inner) => exit_code_for_failures(&inner.failures),
        RunnerError::ParallelExecution(inner) => exit_code_for_failures(&inner.failures),
    }
}

/// Picks the most specific exit code across a batch's failures, preferring
/// the narrowest classification spec.md §6 defines: auth (env) > rate_limit
/// > network (timeout) > provider_error (catch-all).
fn exit_code_for_failures(failures: &[FailureSummary]) -> i32 {
    let kinds: Vec<&str> = failures.iter().filter_map(|f| f.failure_kind.as_deref()).collect();
    if kinds.contains(&"auth") {
        EXIT_ENV_ERROR
    } else if kinds.contains(&"rate_limit") {
        EXIT_RATE_LIMIT
    } else if kinds.contains(&"timeout") {
        EXIT_NETWORK
    } else {
        EXIT_PROVIDER_ERROR
    }
}

async fn run(args: cli::Cli) -> anyhow::Result<()> {
    let mode = ExecutionMode::parse(&args.mode)
        .ok_or_else(|| CliError::Input(format!("unknown --mode '{}'", args.mode)))?;
    let aggregate = AggregateKind::parse(&args.aggregate)
        .ok_or_else(|| CliError::Input(format!("unknown --aggregate '{}'", args.aggregate)))?;

    let provider_configs: Vec<ProviderConfig> = args
        .providers
        .iter()
        .map(|path| ProviderConfig::load(path).map_err(|e| CliError::Input(e.to_string())))
        .collect::<Result<_, _>>()?;

    let mut providers = Vec::with_capacity(provider_configs.len());
    for config in provider_configs {
        let handle = registry::build(&config).map_err(|e| CliError::Env(e.to_string()))?;
        providers.push(RunnerProvider { config, handle });
    }

    let judge = match &args.judge {
        Some(path) => Some(load_runner_provider(path)?),
        None => None,
    };
    let shadow = match &args.shadow {
        Some(path) => Some(load_runner_provider(path)?),
        None => None,
    };

    let schema = match &args.schema {
        Some(path) => Some(Schema::load(path).map_err(|e| CliError::Input(e.to_string()))?),
        None => None,
    };

    let budget_book = match &args.budgets {
        Some(path) => BudgetBook::load(path).map_err(|e| CliError::Input(e.to_string()))?,
        None => BudgetBook::default(),
    };

    let runner_config = RunnerConfig {
        mode,
        aggregate,
        quorum: args.quorum,
        tie_breaker: args.tie_breaker.clone(),
        provider_weights: args.weights.clone(),
        schema_path: args.schema.as_ref().map(|p| p.display().to_string()),
        judge_provider: judge.as_ref().map(|j| j.config.clone()),
        max_concurrency: args.max_concurrency,
        rpm: args.rpm,
        shadow_provider: shadow.as_ref().map(|s| s.config.clone()),
        metrics_path: args.metrics.as_ref().map(|p| p.display().to_string()),
        allow_overrun: args.allow_overrun,
        backoff_policy: BackoffPolicy::default(),
    };

    let tasks = golden::load(&args.prompts).map_err(|e| CliError::Input(e.to_string()))?;
    if tasks.is_empty() {
        return Err(CliError::Input(format!("{} contains no golden tasks", args.prompts.display())).into());
    }

    let logger: Arc<dyn EventLogger> = match &args.metrics {
        Some(path) => Arc::new(CompositeLogger::new().with_sink(Box::new(JsonlLogger::new(path)))),
        None => Arc::new(MemoryLogger::new()),
    };

    let run_id = format!("run-{}", std::process::id());
    let runner = Arc::new(Runner::new(
        runner_config,
        providers,
        shadow,
        judge,
        schema,
        Arc::new(BudgetManager::new(budget_book)),
        logger,
        Arc::new(RealClock),
        run_id,
    ));

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut scored = 0usize;

    for task in &tasks {
        for repetition in 0..args.repeat {
            let prompt_id = format!("{}#{repetition}", task.id);
            let request = ProviderRequest {
                model: String::new(),
                prompt: task.render_prompt(),
                messages: None,
                max_tokens: None,
                temperature: None,
                top_p: None,
                stop: vec![],
                timeout: std::time::Duration::from_secs(60),
                options: HashMap::new(),
                metadata: HashMap::new(),
            };

            let outcome = runner.run_prompt(&prompt_id, request).await?;
            let winner_text = winning_output(&outcome.batch);
            let result = golden::score(task, winner_text.as_deref());
            if let Some(passed_flag) = result.eval.passed {
                scored += 1;
                if passed_flag {
                    passed += 1;
                } else {
                    failed += 1;
                }
            }
            println!(
                "{} [{repetition}] {} -> {}",
                task.display_name(),
                prompt_id,
                match result.eval.passed {
                    Some(true) => "pass",
                    Some(false) => "fail",
                    None => "no_output",
                }
            );
        }
    }

    tracing::info!(scored, passed, failed, "run complete");
    if scored > 0 && failed == scored {
        return Err(CliError::Other(anyhow::anyhow!("all {scored} scored golden tasks failed")).into());
    }

    Ok(())
}

fn load_runner_provider(path: &std::path::Path) -> anyhow::Result<RunnerProvider> {
    let config = ProviderConfig::load(path).map_err(|e| CliError::Input(e.to_string()))?;
    let handle = registry::build(&config).map_err(|e| CliError::Env(e.to_string()))?;
    Ok(RunnerProvider { config, handle })
}

fn winning_output(batch: &[(usize, AttemptResult)]) -> Option<String> {
    batch
        .iter()
        .find(|(_, attempt)| attempt.aggregate_output)
        .or_else(|| batch.iter().find(|(_, attempt)| attempt.is_candidate()))
        .and_then(|(_, attempt)| attempt.metrics.output_text.clone())
}
