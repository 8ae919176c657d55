//! Attempt Executors (spec.md §4.3): the per-mode coordinators that run one
//! provider-invoker call per provider and assemble the resulting batch.
//!
//! Grounded in the teacher's `gateway/failover.rs` `FailoverManager`
//! (priority ordering, provider statistics, failover classification) for
//! [`sequential`], generalized to the per-attempt contract here; the
//! parallel state machine in [`parallel`] follows `original_source`'s
//! `adapter/core/parallel/coordinators/{any,base}.py` cancellation and
//! failure-accounting semantics.

pub mod consensus;
pub mod parallel;
pub mod parallel_all;
pub mod parallel_any;
pub mod sequential;

use crate::metrics::RunMetrics;
use crate::provider::ProviderResponse;

/// Output of one provider invocation within an attempt (§3).
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub metrics: RunMetrics,
    pub raw_output: Option<ProviderResponse>,
    /// Set by the Budget Manager when the run must stop after this result.
    pub stop_reason: Option<String>,
    pub error_message: Option<String>,
    /// Whether the executor should advance to the next provider in the same
    /// attempt (Sequential failover; also read by Parallel-Any/-All/
    /// Consensus bookkeeping even though they do not failover).
    pub backoff_next_provider: bool,
    /// Set once aggregation picks this result as the winner; carried on the
    /// `AttemptResult` rather than recomputed, so the logger can tag it.
    pub aggregate_output: bool,
}

impl AttemptResult {
    /// An ok result is a Candidate (glossary) when it also has non-empty
    /// output text.
    pub fn is_candidate(&self) -> bool {
        matches!(self.metrics.status, crate::metrics::Status::Ok)
            && self.metrics.output_text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// One provider's terminal failure, carried on `*ExecutionError.failures`
/// (§3).
#[derive(Debug, Clone)]
pub struct FailureSummary {
    pub index: usize,
    pub provider: String,
    pub status: crate::metrics::Status,
    pub failure_kind: Option<String>,
    pub error_message: Option<String>,
    pub backoff_next_provider: bool,
    pub retries: u32,
    pub error_type: Option<String>,
}

impl FailureSummary {
    pub fn from_attempt(index: usize, provider: &str, attempt: &AttemptResult) -> Self {
        Self {
            index,
            provider: provider.to_string(),
            status: attempt.metrics.status,
            failure_kind: attempt.metrics.failure_kind.clone(),
            error_message: attempt.metrics.error_message.clone(),
            backoff_next_provider: attempt.backoff_next_provider,
            retries: attempt.metrics.retries,
            error_type: attempt.metrics.error_type.clone(),
        }
    }
}

/// The `(provider_index, AttemptResult)` pairs produced by one attempt
/// (glossary: Batch).
pub type Batch = Vec<(usize, AttemptResult)>;
