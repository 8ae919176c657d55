//! Typed error taxonomy for the runner core.
//!
//! Providers and the invoker communicate failure through these enums rather
//! than ad-hoc strings, so every caller can classify a failure into the
//! `failure_kind` taxonomy without re-parsing error text.

use thiserror::Error;

use crate::executor::{AttemptResult, FailureSummary};

/// Failure surfaced by a provider's `invoke` call.
///
/// Providers must not panic to signal failure — every failure mode they can
/// produce is a variant here, classified at the source rather than sniffed
/// out of an error message downstream.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("retriable error: {0}")]
    Retriable(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("provider skipped: {0}")]
    Skip(String),
    #[error("invalid provider configuration: {0}")]
    Config(String),
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// The `failure_kind` this error classifies to.
    pub fn failure_kind(&self) -> &'static str {
        match self {
            ProviderError::Auth(_) => "auth",
            ProviderError::RateLimit(_) => "rate_limit",
            ProviderError::Retriable(_) => "retryable",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Skip(_) => "skip",
            ProviderError::Config(_) => "auth",
            ProviderError::Other(_) => "provider_error",
        }
    }

    /// Whether the invoker should exhaust this provider for the remainder
    /// of the current attempt (Sequential failover, §4.2 edge policy).
    pub fn backoff_next_provider(&self) -> bool {
        matches!(
            self,
            ProviderError::Auth(_)
                | ProviderError::Config(_)
                | ProviderError::Skip(_)
                | ProviderError::Timeout(_)
        )
    }

    pub fn is_retriable_locally(&self) -> bool {
        matches!(self, ProviderError::RateLimit(_) | ProviderError::Retriable(_))
    }
}

/// Raised by the Sequential executor when every configured provider failed
/// within a single attempt.
#[derive(Debug, Error)]
#[error("all providers failed for this attempt ({} results)", .batch.len())]
pub struct AllFailedError {
    pub batch: Vec<(usize, AttemptResult)>,
    pub failures: Vec<FailureSummary>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Raised by Parallel-Any/-All and Consensus when no provider in the batch
/// produced an `ok` result (or, for Consensus, when quorum was not met).
#[derive(Debug, Error)]
#[error("parallel execution failed ({} failures of {} results)", .failures.len(), .batch.len())]
pub struct ParallelExecutionError {
    pub batch: Vec<(usize, AttemptResult)>,
    pub failures: Vec<FailureSummary>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Top-level runner error, covering configuration and aggregation failures
/// that are not provider-attempt failures.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("weighted_vote requires provider_weights")]
    MissingProviderWeights,
    #[error("provider_weights contains unknown providers: {0}")]
    UnknownWeightedProvider(String),
    #[error("aggregate=judge requires a judge provider to be configured")]
    MissingJudgeProvider,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    AllFailed(#[from] AllFailedError),
    #[error(transparent)]
    ParallelExecution(#[from] ParallelExecutionError),
}
