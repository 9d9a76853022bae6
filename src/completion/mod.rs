//! Completion client: one prompt in, generated text or a typed failure out
//!
//! The [`CompletionClient`] trait is the seam between the pipeline and the
//! external completion service. [`HttpCompletionClient`] talks to a real
//! provider; [`ScriptedCompletionClient`] replays canned answers.

pub mod classify;
pub mod http;
pub mod scripted;

pub use classify::{classify_failure, RejectionKind};
pub use http::{extract_text, HttpCompletionClient};
pub use scripted::ScriptedCompletionClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::ResearchError;

/// One outbound prompt
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Optional system instruction
    pub system: Option<String>,
    /// Model override; the client's configured model when None
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-call wall-clock limit; the client's default when None
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            max_tokens,
            temperature,
            timeout: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Failure of a single completion call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The hard per-call deadline expired and the in-flight call was dropped
    #[error("Completion call timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Connection reset, DNS failure, 5xx or similar transient condition
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Well-formed rejection from the service (auth, rate limit, quota, bad request)
    #[error("{kind} ({status}): {message}")]
    Unretryable {
        status: u16,
        kind: RejectionKind,
        message: String,
    },

    /// The response carried no extractable text
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Only transport-class failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::Timeout(_) | CompletionError::Transport(_)
        )
    }
}

impl From<CompletionError> for ResearchError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout(_) | CompletionError::Transport(_) => {
                ResearchError::Transport(err.to_string())
            }
            CompletionError::Unretryable { .. } => {
                ResearchError::UnretryableService(err.to_string())
            }
            CompletionError::MalformedResponse(msg) => ResearchError::MalformedResponse(msg),
        }
    }
}

/// Sends prompts to the completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one prompt and return its text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Fails when the client cannot possibly succeed (missing credential)
    fn ensure_configured(&self) -> Result<(), ResearchError> {
        Ok(())
    }

    /// Short identifier for logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_failures_are_retryable() {
        assert!(CompletionError::Timeout(Duration::from_secs(60)).is_retryable());
        assert!(CompletionError::Transport("connection reset".into()).is_retryable());
        assert!(!CompletionError::MalformedResponse("no text".into()).is_retryable());
        assert!(!CompletionError::Unretryable {
            status: 401,
            kind: RejectionKind::Auth,
            message: "invalid x-api-key".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_conversion_into_research_error() {
        let err: ResearchError = CompletionError::Unretryable {
            status: 429,
            kind: RejectionKind::RateLimit,
            message: "slow down".into(),
        }
        .into();
        assert_eq!(
            err,
            ResearchError::UnretryableService("rate limit (429): slow down".to_string())
        );

        let err: ResearchError = CompletionError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(err, ResearchError::Transport(_)));
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("prompt", 100, 0.2)
            .with_system("system")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(request.system.as_deref(), Some("system"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(request.model.is_none());
    }
}
