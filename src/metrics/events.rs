//! Wire shapes for the two event kinds the logger emits (§4.9).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{RunMetrics, Status};

/// One per provider attempt, including retries and cancellations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallEvent {
    pub run_id: String,
    pub provider: String,
    pub attempt: u32,
    pub status: Status,
    pub latency_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub failure_kind: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Non-identifying fingerprint of the request (`prompt_id` plus model),
    /// not the raw prompt text.
    pub request_fingerprint: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Tagged union of the two event kinds a line in the JSONL stream carries;
/// `event` is the tag field read back by consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    #[serde(rename = "provider_call")]
    ProviderCall(ProviderCallEvent),
    #[serde(rename = "run_metric")]
    RunMetric(Box<RunMetrics>),
}
