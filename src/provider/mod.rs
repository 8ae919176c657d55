//! Provider SPI (spec.md §4.1, §6).
//!
//! A provider is a narrow collaborator: build a request, invoke it, report
//! usage and latency, or fail through one of [`crate::error::ProviderError`]'s
//! classified variants. Concrete transports live in [`http`] and
//! [`offline`]; [`registry`] resolves provider ids to constructors the way
//! the teacher's `PROVIDERS` catalogue resolves ids to display metadata.

pub mod http;
pub mod offline;
pub mod registry;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Built per attempt from the request plus the provider's own config;
/// immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub timeout: std::time::Duration,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// Produced by a provider on success; owned by the attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    pub latency_ms: u64,
    pub token_usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

/// The three operations every provider exposes (spec.md §4.1).
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn capabilities(&self) -> HashSet<String> {
        HashSet::new()
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
