//! Terminal metrics record and its constituent enums (spec.md §3, §4.9).
//!
//! `RunMetrics` is the one record every scheduled provider attempt emits
//! exactly once, as a `run_metric` event (§8 invariant 1). Everything that
//! touches it after creation — schema validation, budget evaluation,
//! aggregation — mutates the same owned value in place; the runner (not the
//! invoker) performs the final emit, per spec.md §9's cyclic-reference note.

pub mod events;
pub mod logger;
#[cfg(feature = "metrics-server")]
pub mod prometheus;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level attempt status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
    Skip,
}

/// Run-level outcome, derived from `Status` but distinct (§3: `outcome`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Skip,
    Error,
}

impl From<Status> for Outcome {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => Outcome::Success,
            Status::Error => Outcome::Error,
            Status::Skip => Outcome::Skip,
        }
    }
}

/// Quality-gate / evaluation sidecar (populated by the CLI's golden-task
/// scorer, §6 `GoldenTask`; left `None` for plain runs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalMetrics {
    #[serde(default)]
    pub expected_kind: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Budget Manager snapshot attached at evaluate() time (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub spent_run_usd: f64,
    pub spent_today_usd: f64,
    pub run_budget_usd: f64,
    pub daily_budget_usd: f64,
}

/// The terminal record for one provider-attempt pair (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub timestamp_ms: u64,
    pub run_id: String,
    pub provider: String,
    pub model: String,
    pub mode: String,
    pub prompt_id: String,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub status: Status,
    #[serde(default)]
    pub failure_kind: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    pub outcome: Outcome,
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub output_hash: Option<String>,
    pub attempts: u32,
    pub retries: u32,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub shadow_provider_id: Option<String>,
    #[serde(default)]
    pub shadow_latency_ms: Option<u64>,
    #[serde(default)]
    pub shadow_status: Option<Status>,
    #[serde(default)]
    pub shadow_outcome: Option<Outcome>,
    #[serde(default)]
    pub shadow_error_message: Option<String>,
    #[serde(default)]
    pub eval: Option<EvalMetrics>,
    #[serde(default)]
    pub budget: Option<BudgetSnapshot>,
    #[serde(default)]
    pub ci_meta: HashMap<String, serde_json::Value>,
}

impl RunMetrics {
    pub fn token_usage_total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// `retries = attempts - 1 + inherited_retries` (§3 invariant); call
    /// with `inherited_retries = 0` unless a provider reported internal
    /// retries of its own (§9: additive reconciliation).
    pub fn reconcile_retries(&mut self, inherited_retries: u32) {
        self.retries = self.attempts.saturating_sub(1) + inherited_retries;
    }

    /// Downgrade an `ok` record to `error` in place (Consensus quorum
    /// failure, budget guard violation).
    pub fn downgrade(&mut self, failure_kind: &str, message: impl Into<String>) {
        self.status = Status::Error;
        self.outcome = Outcome::Error;
        self.failure_kind = Some(failure_kind.to_string());
        let message = message.into();
        self.error_message = Some(match self.error_message.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}|{message}"),
            _ => message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunMetrics {
        RunMetrics {
            timestamp_ms: 0,
            run_id: "r1".into(),
            provider: "p1".into(),
            model: "m".into(),
            mode: "sequential".into(),
            prompt_id: "prompt-0".into(),
            seed: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            input_tokens: 10,
            output_tokens: 5,
            latency_ms: 3,
            cost_usd: 0.0,
            status: Status::Ok,
            failure_kind: None,
            error_message: None,
            error_type: None,
            outcome: Outcome::Success,
            output_text: Some("A".into()),
            output_hash: None,
            attempts: 1,
            retries: 0,
            providers: vec!["p1".into()],
            shadow_provider_id: None,
            shadow_latency_ms: None,
            shadow_status: None,
            shadow_outcome: None,
            shadow_error_message: None,
            eval: None,
            budget: None,
            ci_meta: HashMap::new(),
        }
    }

    #[test]
    fn reconcile_retries_is_additive() {
        let mut m = sample();
        m.attempts = 3;
        m.reconcile_retries(1);
        assert_eq!(m.retries, 3);
    }

    #[test]
    fn downgrade_appends_pipe_separated_message() {
        let mut m = sample();
        m.error_message = Some("prior".into());
        m.downgrade("consensus_quorum", "votes=1, quorum=2");
        assert_eq!(m.status, Status::Error);
        assert_eq!(m.failure_kind.as_deref(), Some("consensus_quorum"));
        assert_eq!(m.error_message.as_deref(), Some("prior|votes=1, quorum=2"));
    }

    #[test]
    fn round_trips_through_json() {
        let m = sample();
        let json = serde_json::to_string(&m).unwrap();
        let back: RunMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.token_usage_total(), m.token_usage_total());
        assert_eq!(back.provider, m.provider);
    }
}
