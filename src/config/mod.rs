//! Configuration data model and YAML loading.
//!
//! Mirrors the teacher's `Config::load` pattern (`read_to_string` +
//! `serde_yaml::from_str`, falling back to a default when the file is
//! absent) generalized from TOML to the YAML shapes spec.md §6 requires.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Retry policy embedded in a provider config (`retries: {max, backoff_s}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetriesConfig {
    #[serde(default = "default_max_retries")]
    pub max: u32,
    #[serde(default = "default_backoff_s")]
    pub backoff_s: f64,
}

fn default_max_retries() -> u32 {
    0
}
fn default_backoff_s() -> f64 {
    0.5
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            max: default_max_retries(),
            backoff_s: default_backoff_s(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub prompt_usd: Option<f64>,
    #[serde(default)]
    pub completion_usd: Option<f64>,
    #[serde(default)]
    pub input_per_million: Option<f64>,
    #[serde(default)]
    pub output_per_million: Option<f64>,
}

impl PricingConfig {
    /// Cost in USD for the given token counts, preferring the
    /// per-million-token rates when present.
    pub fn cost_usd(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let prompt_cost = if let Some(per_m) = self.input_per_million {
            prompt_tokens as f64 * per_m / 1_000_000.0
        } else {
            self.prompt_usd.unwrap_or(0.0) * prompt_tokens as f64
        };
        let completion_cost = if let Some(per_m) = self.output_per_million {
            completion_tokens as f64 * per_m / 1_000_000.0
        } else {
            self.completion_usd.unwrap_or(0.0) * completion_tokens as f64
        };
        prompt_cost + completion_cost
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub rpm: Option<u32>,
    #[serde(default)]
    pub tpm: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGatesConfig {
    #[serde(default)]
    pub determinism_diff_rate_max: Option<f64>,
    #[serde(default)]
    pub determinism_len_stdev_max: Option<f64>,
}

/// One provider's static, read-only-at-runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub auth_env: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    #[serde(default)]
    pub retries: RetriesConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub quality_gates: QualityGatesConfig,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_timeout_s() -> f64 {
    30.0
}

impl ProviderConfig {
    /// Load a single provider config from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read provider config {}", path.display()))?;
        let config: ProviderConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse provider config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the auth environment variable name, honoring the `env` alias
    /// map (§6). Returns `None` when the value is the sentinel `"NONE"`.
    pub fn resolved_auth_env(&self) -> Option<&str> {
        let name = self.auth_env.as_deref()?;
        let aliased = self.env.get(name).map(String::as_str).unwrap_or(name);
        if aliased == "NONE" { None } else { Some(aliased) }
    }
}

/// Execution mode (§2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    ParallelAny,
    ParallelAll,
    Consensus,
}

impl ExecutionMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().replace('-', "_").as_str() {
            "sequential" => Some(Self::Sequential),
            "parallel_any" | "parallelany" => Some(Self::ParallelAny),
            "parallel_all" | "parallelall" => Some(Self::ParallelAll),
            "consensus" => Some(Self::Consensus),
            _ => None,
        }
    }
}

/// Aggregation strategy kind (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    MajorityVote,
    WeightedVote,
    MaxScore,
    Judge,
}

impl AggregateKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().replace('-', "_").as_str() {
            "majority_vote" | "majority" => Some(Self::MajorityVote),
            "weighted_vote" | "weighted" | "weightedvote" => Some(Self::WeightedVote),
            "max_score" | "maxscore" => Some(Self::MaxScore),
            "judge" | "llm_judge" => Some(Self::Judge),
            _ => None,
        }
    }
}

/// Cross-provider backoff behavior on classified failures (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Seconds to sleep before the *same* provider's next attempt on a
    /// rate-limit classification. `None` falls back to the provider's own
    /// `retries.backoff_s`.
    #[serde(default)]
    pub rate_limit_sleep_s: Option<f64>,
    /// Whether a timeout advances to the next provider immediately (true,
    /// the default) rather than retrying the same one.
    #[serde(default = "default_timeout_next_provider")]
    pub timeout_next_provider: bool,
}

fn default_timeout_next_provider() -> bool {
    true
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_sleep_s: None,
            timeout_next_provider: default_timeout_next_provider(),
        }
    }
}

/// Immutable per-run configuration (§3 `RunnerConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub mode: ExecutionMode,
    #[serde(default = "default_aggregate")]
    pub aggregate: AggregateKind,
    #[serde(default)]
    pub quorum: Option<u32>,
    #[serde(default)]
    pub tie_breaker: Option<String>,
    #[serde(default)]
    pub provider_weights: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub schema_path: Option<String>,
    #[serde(default)]
    pub judge_provider: Option<ProviderConfig>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub rpm: u32,
    #[serde(default)]
    pub shadow_provider: Option<ProviderConfig>,
    #[serde(default)]
    pub metrics_path: Option<String>,
    #[serde(default)]
    pub allow_overrun: bool,
    #[serde(default)]
    pub backoff_policy: BackoffPolicy,
}

fn default_aggregate() -> AggregateKind {
    AggregateKind::MajorityVote
}
fn default_max_concurrency() -> usize {
    4
}

/// Default quorum used by Consensus when unset (§4.5, preserved per
/// spec.md §9 Open Question: this is preserved even for single-provider
/// consensus runs, which then always fail quorum).
pub const DEFAULT_QUORUM: u32 = 2;

impl RunnerConfig {
    pub fn effective_quorum(&self) -> u32 {
        self.quorum.unwrap_or(DEFAULT_QUORUM)
    }
}

/// One provider-budget rule (`budgets.yaml`'s `default`/`overrides` entries).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetRule {
    #[serde(default)]
    pub run_budget_usd: f64,
    #[serde(default)]
    pub daily_budget_usd: f64,
    #[serde(default)]
    pub stop_on_budget_exceed: bool,
}

/// Budget book: a default rule plus per-provider overrides (§4.6, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetBook {
    #[serde(default)]
    pub default: BudgetRule,
    #[serde(default)]
    pub overrides: HashMap<String, BudgetRule>,
}

impl BudgetBook {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read budget book {}", path.display()))?;
        let book: BudgetBook = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse budget book {}", path.display()))?;
        Ok(book)
    }

    pub fn rule_for(&self, provider_name: &str) -> &BudgetRule {
        self.overrides.get(provider_name).unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_aliases() {
        assert_eq!(ExecutionMode::parse("parallel-any"), Some(ExecutionMode::ParallelAny));
        assert_eq!(ExecutionMode::parse("PARALLEL_ANY"), Some(ExecutionMode::ParallelAny));
        assert_eq!(ExecutionMode::parse("bogus"), None);
    }

    #[test]
    fn resolved_auth_env_honors_none_sentinel() {
        let mut cfg = ProviderConfig {
            provider: "ollama".into(),
            model: "llama3.1".into(),
            auth_env: Some("NONE".into()),
            endpoint: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            seed: None,
            timeout_s: 30.0,
            retries: RetriesConfig::default(),
            pricing: PricingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            quality_gates: QualityGatesConfig::default(),
            options: HashMap::new(),
            env: HashMap::new(),
        };
        assert_eq!(cfg.resolved_auth_env(), None);

        cfg.auth_env = Some("OPENAI_KEY".into());
        cfg.env.insert("OPENAI_KEY".into(), "OPENAI_API_KEY".into());
        assert_eq!(cfg.resolved_auth_env(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn budget_book_falls_back_to_default() {
        let mut book = BudgetBook::default();
        book.default.run_budget_usd = 5.0;
        book.overrides.insert(
            "anthropic".into(),
            BudgetRule { run_budget_usd: 10.0, daily_budget_usd: 50.0, stop_on_budget_exceed: true },
        );
        assert_eq!(book.rule_for("openai").run_budget_usd, 5.0);
        assert_eq!(book.rule_for("anthropic").run_budget_usd, 10.0);
    }
}
