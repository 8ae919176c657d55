//! Command-line surface (spec.md §6), implemented with `clap` derive the
//! way the teacher's `GatewayCli`/`RunArgs` pair does: one top-level struct
//! plus `ValueEnum`s for the closed-choice flags.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "llm-runner", version, about = "Multi-provider LLM request dispatcher")]
pub struct Cli {
    /// Comma-separated provider config YAML paths.
    #[arg(long, value_delimiter = ',', required = true)]
    pub providers: Vec<PathBuf>,

    /// Golden-task JSONL file to run.
    #[arg(long)]
    pub prompts: PathBuf,

    /// Number of times to repeat each prompt.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Execution mode (aliases: parallel-any, parallel-all accepted).
    #[arg(long, default_value = "sequential")]
    pub mode: String,

    /// Aggregation strategy (aliases: majority, weighted, maxscore accepted).
    #[arg(long, default_value = "majority_vote")]
    pub aggregate: String,

    /// Consensus quorum (defaults to the runner's built-in default).
    #[arg(long)]
    pub quorum: Option<u32>,

    /// Tie-breaker axis: min_latency, min_cost, stable_order (default: composite).
    #[arg(long)]
    pub tie_breaker: Option<String>,

    /// JSON schema file the winning output must satisfy.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Judge provider config YAML, required for aggregate=max_score|judge.
    #[arg(long)]
    pub judge: Option<PathBuf>,

    /// Provider weights for aggregate=weighted_vote, `key=val,key=val`.
    #[arg(long, value_parser = parse_weights)]
    pub weights: Option<HashMap<String, f64>>,

    /// Max concurrent in-flight provider calls for parallel/consensus modes.
    #[arg(long, default_value_t = 4)]
    pub max_concurrency: usize,

    /// Requests-per-minute cap shared across all providers (0 disables it).
    #[arg(long, default_value_t = 0)]
    pub rpm: u32,

    /// Append-only JSONL metrics sink path.
    #[arg(long)]
    pub metrics: Option<PathBuf>,

    /// Budget book YAML (per-provider run/daily USD caps).
    #[arg(long)]
    pub budgets: Option<PathBuf>,

    /// Continue past a budget breach instead of downgrading to guard_violation.
    #[arg(long, default_value_t = false)]
    pub allow_overrun: bool,

    /// Shadow provider config YAML, invoked alongside the first provider.
    #[arg(long)]
    pub shadow: Option<PathBuf>,

    /// Tracing log level (error, warn, info, debug, trace, or an EnvFilter spec).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_weights(raw: &str) -> Result<HashMap<String, f64>, String> {
    let mut weights = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| format!("invalid weight entry '{pair}', expected key=val"))?;
        let value: f64 = value.trim().parse().map_err(|_| format!("invalid weight value for '{key}': '{value}'"))?;
        weights.insert(key.trim().to_string(), value);
    }
    Ok(weights)
}
