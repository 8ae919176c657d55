//! Offline-only provider stub (spec.md §6: `LLM_ADAPTER_OFFLINE=1`).
//!
//! Wraps a local-inference provider (e.g. an Ollama adapter) so that when
//! the offline toggle is not set, attempts against it surface
//! `ProviderError::Skip` instead of making a network call — the same
//! "local providers require an explicit opt-in" posture the teacher's
//! catalogue documents for Ollama/LM Studio/exo.

use async_trait::async_trait;

use crate::error::ProviderError;
use super::{Provider, ProviderRequest, ProviderResponse};

#[derive(Debug)]
pub struct OfflineGuardedProvider<P: Provider> {
    inner: P,
}

impl<P: Provider> OfflineGuardedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    fn offline_enabled() -> bool {
        std::env::var("LLM_ADAPTER_OFFLINE").map(|v| v == "1").unwrap_or(false)
    }
}

#[async_trait]
impl<P: Provider> Provider for OfflineGuardedProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> std::collections::HashSet<String> {
        self.inner.capabilities()
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if !Self::offline_enabled() {
            return Err(ProviderError::Skip(format!(
                "{} is offline-only; set LLM_ADAPTER_OFFLINE=1 to enable it",
                self.inner.name()
            )));
        }
        self.inner.invoke(request).await
    }
}
