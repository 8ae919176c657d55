//! OpenAI-compatible HTTP provider adapter.
//!
//! Single-shot transport: the retry loop itself lives in
//! [`crate::invoker::ProviderInvoker`] (spec.md §4.2), not here — this type
//! only builds one request, sends it, and classifies the result into a
//! [`ProviderError`] variant. Classification follows the same status-code
//! table the teacher's `retry::classify_reqwest_result` uses.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::error::ProviderError;
use super::{ChatMessage, Provider, ProviderRequest, ProviderResponse, TokenUsage};

#[derive(Debug)]
pub struct HttpProvider {
    id: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(id: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let messages = request.messages.clone().unwrap_or_else(|| {
            vec![ChatMessage { role: "user".into(), content: request.prompt.clone() }]
        });
        let mut body = json!({
            "model": request.model,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if !request.stop.is_empty() {
            body["stop"] = json!(request.stop);
        }
        body
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let timeout = if request.timeout.is_zero() { self.timeout } else { request.timeout };

        let mut builder = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&self.build_body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| classify_transport_error(e, timeout))?;
        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(classify_status(status, response.text().await.unwrap_or_default()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("failed to parse response body: {e}")))?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let finish_reason = body["choices"][0]["finish_reason"].as_str().map(str::to_string);
        let token_usage = TokenUsage {
            prompt: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };

        Ok(ProviderResponse {
            text,
            latency_ms,
            token_usage,
            model: self.model.clone(),
            finish_reason,
            raw: Some(body),
        })
    }
}

fn classify_transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if err.is_connect() || err.is_request() {
        ProviderError::Retriable(err.to_string())
    } else {
        ProviderError::Other(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimit(body),
        StatusCode::REQUEST_TIMEOUT => ProviderError::Retriable(body),
        s if s.is_server_error() => ProviderError::Retriable(body),
        _ => ProviderError::Other(format!("{status}: {body}")),
    }
}
