//! In-process test doubles shared between unit and integration tests.
//!
//! Not behind `#[cfg(test)]` so `tests/*.rs` integration tests (a separate
//! compilation unit) can use the same fixtures, the way the teacher exposes
//! `test-internals`-gated helpers for its own integration suite.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::{Provider, ProviderRequest, ProviderResponse, TokenUsage};

/// A scripted response or failure a [`MockProvider`] yields on successive
/// `invoke` calls.
#[derive(Debug)]
pub enum Scripted {
    Ok(&'static str),
    Err(ProviderError),
}

/// Deterministic provider double: replays a fixed script of outcomes (one
/// entry consumed per `invoke` call, the last entry repeats once exhausted)
/// after an optional artificial delay.
#[derive(Debug)]
pub struct MockProvider {
    id: String,
    script: Vec<Scripted>,
    delay: std::time::Duration,
    calls: AtomicU32,
    log: Mutex<Vec<std::time::Instant>>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>, script: Vec<Scripted>) -> Self {
        Self {
            id: id.into(),
            script,
            delay: std::time::Duration::ZERO,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> HashSet<String> {
        HashSet::new()
    }

    async fn invoke(&self, _request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.lock().unwrap().push(std::time::Instant::now());
        let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let entry = self.script.get(idx).or_else(|| self.script.last());
        match entry {
            Some(Scripted::Ok(text)) => Ok(ProviderResponse {
                text: (*text).to_string(),
                latency_ms: self.delay.as_millis() as u64,
                token_usage: TokenUsage { prompt: 10, completion: 5 },
                model: "mock-model".into(),
                finish_reason: Some("stop".into()),
                raw: None,
            }),
            Some(Scripted::Err(e)) => Err(clone_error(e)),
            None => Err(ProviderError::Other("mock provider has no script entries".into())),
        }
    }
}

fn clone_error(e: &ProviderError) -> ProviderError {
    match e {
        ProviderError::Auth(s) => ProviderError::Auth(s.clone()),
        ProviderError::RateLimit(s) => ProviderError::RateLimit(s.clone()),
        ProviderError::Retriable(s) => ProviderError::Retriable(s.clone()),
        ProviderError::Timeout(d) => ProviderError::Timeout(*d),
        ProviderError::Skip(s) => ProviderError::Skip(s.clone()),
        ProviderError::Config(s) => ProviderError::Config(s.clone()),
        ProviderError::Other(s) => ProviderError::Other(s.clone()),
    }
}

pub fn sample_request(prompt: &str) -> ProviderRequest {
    ProviderRequest {
        model: "mock-model".into(),
        prompt: prompt.to_string(),
        messages: None,
        max_tokens: None,
        temperature: None,
        top_p: None,
        stop: vec![],
        timeout: std::time::Duration::from_secs(5),
        options: Default::default(),
        metadata: Default::default(),
    }
}
