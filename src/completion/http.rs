// HTTP completion client for Anthropic- and OpenAI-compatible providers

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{classify_failure, CompletionClient, CompletionError, CompletionRequest};
use crate::config::{get_provider_preset, ApiProviderPreset, ApiStyle, CompletionSettings};
use crate::models::ResearchError;
use crate::utils::retry::{with_retry, RetryConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Completion client backed by a provider's HTTP API
pub struct HttpCompletionClient {
    http: reqwest::Client,
    preset: &'static ApiProviderPreset,
    endpoint: String,
    model: String,
    /// Never logged
    api_key: Option<String>,
    default_timeout: Duration,
    retry: RetryConfig,
}

impl HttpCompletionClient {
    /// Build a client from settings. A missing credential is allowed here and
    /// reported by [`CompletionClient::ensure_configured`].
    pub fn new(settings: &CompletionSettings, api_key: Option<String>) -> Result<Self, ResearchError> {
        let preset = get_provider_preset(&settings.provider).ok_or_else(|| {
            ResearchError::Configuration(format!(
                "Unknown completion provider '{}'",
                settings.provider
            ))
        })?;

        let base_url = settings.base_url.as_deref().unwrap_or(preset.base_url);
        let http = reqwest::Client::builder()
            .user_agent(concat!("research-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResearchError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            preset,
            endpoint: preset.endpoint(base_url),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| preset.default_model.to_string()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_timeout: settings.timeout(),
            retry: settings.retry.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body in the provider's wire format
    fn build_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model);

        match self.preset.api_style {
            ApiStyle::AnthropicMessages => {
                let mut body = json!({
                    "model": model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "messages": [{ "role": "user", "content": request.prompt }],
                });
                if let Some(ref system) = request.system {
                    body["system"] = json!(system);
                }
                body
            }
            ApiStyle::OpenAiChat => {
                let mut messages = Vec::new();
                if let Some(ref system) = request.system {
                    messages.push(json!({ "role": "system", "content": system }));
                }
                messages.push(json!({ "role": "user", "content": request.prompt }));
                json!({
                    "model": model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "messages": messages,
                })
            }
        }
    }

    /// One attempt: send, bounded by the hard deadline, and extract text
    async fn send_once(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| CompletionError::Unretryable {
            status: 401,
            kind: super::RejectionKind::Auth,
            message: "no credential configured".to_string(),
        })?;

        let mut builder = self.http.post(&self.endpoint).json(&self.build_body(request));
        builder = match self.preset.api_style {
            ApiStyle::AnthropicMessages => builder
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ApiStyle::OpenAiChat => builder.bearer_auth(api_key),
        };

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let style = self.preset.api_style;

        let call = async move {
            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status();
            let body = response.text().await.map_err(transport_error)?;

            if !status.is_success() {
                return Err(classify_failure(status.as_u16(), &body));
            }

            extract_text(style, &body)
        };

        // Dropping the future on expiry abandons the in-flight request
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let outcome = with_retry(
            |_| self.send_once(request),
            &self.retry,
            CompletionError::is_retryable,
            None::<fn(u32, &CompletionError, Duration)>,
        )
        .await;

        if let Err(ref e) = outcome.result {
            log::warn!(
                "Completion call to {} failed after {} attempt(s): {}",
                self.preset.id,
                outcome.attempts,
                e
            );
        }

        outcome.result
    }

    fn ensure_configured(&self) -> Result<(), ResearchError> {
        if self.api_key.is_none() {
            return Err(ResearchError::Configuration(format!(
                "No API credential configured for provider '{}' (set {})",
                self.preset.id,
                crate::config::API_KEY_ENV
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.preset.id
    }
}

fn transport_error(e: reqwest::Error) -> CompletionError {
    CompletionError::Transport(e.to_string())
}

/// Extract generated text from a provider response body.
/// Anything without non-blank text is a malformed response.
pub fn extract_text(style: ApiStyle, body: &str) -> Result<String, CompletionError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let text = match style {
        ApiStyle::AnthropicMessages => value
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()).unwrap_or("text") == "text")
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            }),
        ApiStyle::OpenAiChat => value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string()),
    };

    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
        Some(_) => Err(CompletionError::MalformedResponse(
            "response contained empty text".to_string(),
        )),
        None => Err(CompletionError::MalformedResponse(
            "response has no text field".to_string(),
        )),
    }
}
