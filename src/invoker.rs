//! Provider Invoker (spec.md §4.2): wraps a single provider call with the
//! retry loop, error classification, latency measurement and shadow
//! coordination.
//!
//! The retry shape follows the teacher's `retry::RetryPolicy` /
//! `retry_with_backoff` in spirit — attempt counting, exponential-ish
//! backoff — but classification comes from [`ProviderError`] variants
//! rather than `reqwest` status codes, and the loop has to interleave
//! token-bucket reacquisition and shadow coordination the generic helper
//! doesn't know about, so it's inlined here instead of reusing
//! `retry_with_backoff` directly.

use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::config::{BackoffPolicy, ProviderConfig};
use crate::error::ProviderError;
use crate::provider::{Provider, ProviderRequest, ProviderResponse};
use crate::shadow::{ShadowHandle, ShadowOutcome};
use crate::token_bucket::TokenBucket;

/// Output of one provider invocation (§4.2 contract).
pub struct ProviderCallResult {
    pub response: Option<ProviderResponse>,
    pub status: crate::metrics::Status,
    pub failure_kind: Option<String>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub latency_ms: u64,
    pub retries: u32,
    pub backoff_next_provider: bool,
    pub shadow: Option<ShadowOutcome>,
}

pub struct ProviderInvoker {
    clock: Arc<dyn Clock>,
    token_bucket: Arc<TokenBucket>,
}

impl ProviderInvoker {
    pub fn new(clock: Arc<dyn Clock>, token_bucket: Arc<TokenBucket>) -> Self {
        Self { clock, token_bucket }
    }

    /// Runs `provider` against `request`, retrying per `config.retries` and
    /// `backoff_policy`, optionally racing a shadow provider alongside.
    pub async fn invoke(
        &self,
        config: &ProviderConfig,
        provider: &dyn Provider,
        request: &ProviderRequest,
        backoff_policy: &BackoffPolicy,
        shadow: Option<(Arc<dyn Provider>, ProviderRequest)>,
    ) -> ProviderCallResult {
        let shadow_handle = shadow.map(|(provider, request)| (provider.name().to_string(), ShadowHandle::spawn(provider, request)));

        let max_attempts = config.retries.max;
        let mut retries = 0u32;
        let mut attempt = 0u32;

        let result = loop {
            self.token_bucket.acquire().await;

            let start = Instant::now();
            let outcome = provider.invoke(request).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(response) => {
                    break ProviderCallResult {
                        response: Some(response),
                        status: crate::metrics::Status::Ok,
                        failure_kind: None,
                        error_message: None,
                        error_type: None,
                        latency_ms,
                        retries,
                        backoff_next_provider: false,
                        shadow: None,
                    };
                }
                Err(err @ (ProviderError::RateLimit(_) | ProviderError::Retriable(_))) => {
                    if attempt < max_attempts {
                        let sleep_s = backoff_policy.rate_limit_sleep_s.unwrap_or(config.retries.backoff_s);
                        self.clock.sleep(std::time::Duration::from_secs_f64(sleep_s)).await;
                        retries += 1;
                        attempt += 1;
                        continue;
                    }
                    let backoff_next_provider = err_backoff_next_provider(&err, backoff_policy);
                    break terminal(err, latency_ms, retries, backoff_next_provider);
                }
                Err(err) => {
                    let backoff_next_provider = err_backoff_next_provider(&err, backoff_policy);
                    break terminal(err, latency_ms, retries, backoff_next_provider);
                }
            }
        };

        let shadow_outcome = match shadow_handle {
            Some((provider_id, handle)) => Some(handle.join(&provider_id).await),
            None => None,
        };

        ProviderCallResult { shadow: shadow_outcome, ..result }
    }
}

fn err_backoff_next_provider(err: &ProviderError, backoff_policy: &BackoffPolicy) -> bool {
    match err {
        ProviderError::Timeout(_) => backoff_policy.timeout_next_provider,
        _ => err.backoff_next_provider(),
    }
}

fn terminal(err: ProviderError, latency_ms: u64, retries: u32, backoff_next_provider: bool) -> ProviderCallResult {
    let status = if matches!(err, ProviderError::Skip(_)) {
        crate::metrics::Status::Skip
    } else {
        crate::metrics::Status::Error
    };
    let error_type = match &err {
        ProviderError::Auth(_) => "AuthError",
        ProviderError::RateLimit(_) => "RateLimitError",
        ProviderError::Retriable(_) => "RetriableError",
        ProviderError::Timeout(_) => "TimeoutError",
        ProviderError::Skip(_) => "ProviderSkip",
        ProviderError::Config(_) => "ConfigError",
        ProviderError::Other(_) => "ProviderError",
    };
    ProviderCallResult {
        response: None,
        status,
        failure_kind: Some(err.failure_kind().to_string()),
        error_message: Some(err.to_string()),
        error_type: Some(error_type.to_string()),
        latency_ms,
        retries,
        backoff_next_provider,
        shadow: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::{PricingConfig, QualityGatesConfig, RateLimitConfig, RetriesConfig};
    use crate::testing::{sample_request, MockProvider, Scripted};
    use std::collections::HashMap;

    fn provider_config(max_retries: u32, backoff_s: f64) -> ProviderConfig {
        ProviderConfig {
            provider: "p1".into(),
            model: "m".into(),
            auth_env: None,
            endpoint: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            seed: None,
            timeout_s: 5.0,
            retries: RetriesConfig { max: max_retries, backoff_s },
            pricing: PricingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            quality_gates: QualityGatesConfig::default(),
            options: HashMap::new(),
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn single_ok_call_needs_no_retry() {
        let clock = FakeClock::new(1);
        let bucket = Arc::new(TokenBucket::new(0, clock.clone()));
        let invoker = ProviderInvoker::new(clock, bucket);
        let provider = MockProvider::new("p1", vec![Scripted::Ok("A")]);

        let result = invoker
            .invoke(&provider_config(0, 0.0), &provider, &sample_request("hi"), &BackoffPolicy::default(), None)
            .await;

        assert_eq!(result.status, crate::metrics::Status::Ok);
        assert_eq!(result.retries, 0);
    }

    #[tokio::test]
    async fn rate_limit_retries_until_success_and_sleeps_each_time() {
        use crate::error::ProviderError;
        let clock = FakeClock::new(1);
        let bucket = Arc::new(TokenBucket::new(0, clock.clone()));
        let invoker = ProviderInvoker::new(clock.clone(), bucket);
        let provider = MockProvider::new(
            "p1",
            vec![
                Scripted::Err(ProviderError::RateLimit("slow down".into())),
                Scripted::Err(ProviderError::RateLimit("slow down".into())),
                Scripted::Ok("ok"),
            ],
        );

        let result = invoker
            .invoke(&provider_config(2, 0.05), &provider, &sample_request("r"), &BackoffPolicy::default(), None)
            .await;

        assert_eq!(result.status, crate::metrics::Status::Ok);
        assert_eq!(result.retries, 2);
        let sleeps = clock.recorded_sleeps();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps.iter().all(|d| *d == std::time::Duration::from_secs_f64(0.05)));
    }

    #[tokio::test]
    async fn timeout_backs_off_to_next_provider_by_default() {
        let clock = FakeClock::new(1);
        let bucket = Arc::new(TokenBucket::new(0, clock.clone()));
        let invoker = ProviderInvoker::new(clock, bucket);
        let provider = MockProvider::new("p1", vec![Scripted::Err(ProviderError::Timeout(std::time::Duration::from_secs(5)))]);

        let result = invoker
            .invoke(&provider_config(1, 0.0), &provider, &sample_request("hi"), &BackoffPolicy::default(), None)
            .await;

        assert_eq!(result.status, crate::metrics::Status::Error);
        assert_eq!(result.failure_kind.as_deref(), Some("timeout"));
        assert!(result.backoff_next_provider);
    }

    #[tokio::test]
    async fn skip_reports_skip_status_and_exhausts_provider() {
        let clock = FakeClock::new(1);
        let bucket = Arc::new(TokenBucket::new(0, clock.clone()));
        let invoker = ProviderInvoker::new(clock, bucket);
        let provider = MockProvider::new("p1", vec![Scripted::Err(ProviderError::Skip("offline".into()))]);

        let result = invoker
            .invoke(&provider_config(0, 0.0), &provider, &sample_request("hi"), &BackoffPolicy::default(), None)
            .await;

        assert_eq!(result.status, crate::metrics::Status::Skip);
        assert_eq!(result.failure_kind.as_deref(), Some("skip"));
        assert!(result.backoff_next_provider);
    }
}
