//! Static provider-id → constructor registry (spec.md §6: "registration is
//! static at startup"). Grounded in the teacher's `PROVIDERS: &[ProviderDef]`
//! catalogue and `provider_by_id` lookup in `providers.rs`, generalized from
//! a data-only catalogue into one that also builds a live [`Provider`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderConfig;
use super::http::HttpProvider;
use super::offline::OfflineGuardedProvider;
use super::Provider;

/// Known local-inference provider ids that require the offline opt-in
/// (spec.md §6).
const OFFLINE_ONLY: &[&str] = &["ollama", "lmstudio", "exo"];

fn default_base_url(provider_id: &str) -> Option<&'static str> {
    match provider_id {
        "anthropic" => Some("https://api.anthropic.com/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "xai" => Some("https://api.x.ai/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "lmstudio" => Some("http://localhost:1234/v1"),
        "exo" => Some("http://localhost:52415/v1"),
        _ => None,
    }
}

/// Build a live provider handle from a [`ProviderConfig`], resolving the
/// API key from the environment variable named by `auth_env`/`env` (§6).
pub fn build(config: &ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let base_url = config
        .endpoint
        .clone()
        .or_else(|| default_base_url(&config.provider).map(str::to_string))
        .ok_or_else(|| anyhow::anyhow!("no endpoint configured for provider '{}'", config.provider))?;

    let api_key = match config.resolved_auth_env() {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            anyhow::anyhow!("missing required environment variable '{}' for provider '{}'", var, config.provider)
        })?),
        None => None,
    };

    let timeout = Duration::from_secs_f64(config.timeout_s);
    let http = HttpProvider::new(config.provider.clone(), config.model.clone(), base_url, api_key, timeout);

    if OFFLINE_ONLY.contains(&config.provider.as_str()) {
        Ok(Arc::new(OfflineGuardedProvider::new(http)))
    } else {
        Ok(Arc::new(http))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PricingConfig, QualityGatesConfig, RateLimitConfig, RetriesConfig};
    use std::collections::HashMap;

    fn base_config(provider: &str) -> ProviderConfig {
        ProviderConfig {
            provider: provider.into(),
            model: "m".into(),
            auth_env: None,
            endpoint: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            seed: None,
            timeout_s: 10.0,
            retries: RetriesConfig::default(),
            pricing: PricingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            quality_gates: QualityGatesConfig::default(),
            options: HashMap::new(),
            env: HashMap::new(),
        }
    }

    #[test]
    fn builds_offline_guarded_provider_for_local_ids() {
        let provider = build(&base_config("ollama")).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn errors_without_endpoint_for_unknown_provider() {
        let err = build(&base_config("custom")).unwrap_err();
        assert!(err.to_string().contains("no endpoint configured"));
    }

    #[test]
    fn errors_on_missing_auth_env() {
        let mut cfg = base_config("openai");
        cfg.auth_env = Some("LLM_RUNNER_TEST_MISSING_KEY_XYZ".into());
        let err = build(&cfg).unwrap_err();
        assert!(err.to_string().contains("missing required environment variable"));
    }
}
