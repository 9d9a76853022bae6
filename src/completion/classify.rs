// Classification of non-success completion responses

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::CompletionError;
use crate::utils::truncate_chars;

/// Why the completion service refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Missing, invalid or unauthorized credential
    Auth,
    /// HTTP 429 or explicit rate limit message
    RateLimit,
    /// Account quota or billing limit reached
    QuotaExceeded,
    /// The request itself was rejected (bad model, too many tokens, ...)
    InvalidRequest,
    /// Anything else the service refused
    Other,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::Auth => "authentication failed",
            RejectionKind::RateLimit => "rate limit",
            RejectionKind::QuotaExceeded => "quota exceeded",
            RejectionKind::InvalidRequest => "invalid request",
            RejectionKind::Other => "request rejected",
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct CompiledPattern {
    regex: Regex,
    kind: RejectionKind,
}

// Static patterns for efficient reuse
static PATTERNS: OnceLock<Vec<CompiledPattern>> = OnceLock::new();

fn get_patterns() -> &'static Vec<CompiledPattern> {
    PATTERNS.get_or_init(|| {
        [
            // Quota patterns first: quota errors often also mention "limit"
            (r"(?i)quota\s*(exceeded|limit)", RejectionKind::QuotaExceeded),
            (r"(?i)insufficient[_\s]quota", RejectionKind::QuotaExceeded),
            (r"(?i)usage\s+limit\s+(exceeded|reached)", RejectionKind::QuotaExceeded),
            (r"(?i)credit\s+balance", RejectionKind::QuotaExceeded),
            (r"(?i)rate[_\-\s]?limit(ed|ing)?", RejectionKind::RateLimit),
            (r"(?i)too\s+many\s+requests", RejectionKind::RateLimit),
            (r"(?i)(invalid|missing)\s+(x-)?api[_\-\s]?key", RejectionKind::Auth),
            (r"(?i)authentication", RejectionKind::Auth),
            (r"(?i)unauthori[sz]ed", RejectionKind::Auth),
        ]
        .into_iter()
        .filter_map(|(pattern, kind)| match Regex::new(pattern) {
            Ok(regex) => Some(CompiledPattern { regex, kind }),
            Err(e) => {
                log::error!("Invalid rejection pattern '{}': {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

/// Find a rejection kind mentioned in an error body
fn detect_kind(body: &str) -> Option<RejectionKind> {
    get_patterns()
        .iter()
        .find(|p| p.regex.is_match(body))
        .map(|p| p.kind)
}

/// Pull the vendor's own message out of a JSON error body when there is one
fn vendor_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
    });

    match message {
        Some(m) => m.to_string(),
        None if body.trim().is_empty() => "no response body".to_string(),
        None => truncate_chars(body.trim(), 300),
    }
}

/// Turn a non-success HTTP status and its body into a completion error.
///
/// 5xx (including 529 "overloaded") and 408 are transient and map to
/// `Transport`; every other status is a well-formed refusal and is not retried.
pub fn classify_failure(status: u16, body: &str) -> CompletionError {
    let message = vendor_message(body);

    if status >= 500 || status == 408 {
        return CompletionError::Transport(format!(
            "completion service unavailable ({}): {}",
            status, message
        ));
    }

    let kind = match status {
        401 | 403 => RejectionKind::Auth,
        402 => RejectionKind::QuotaExceeded,
        429 => match detect_kind(body) {
            Some(RejectionKind::QuotaExceeded) => RejectionKind::QuotaExceeded,
            _ => RejectionKind::RateLimit,
        },
        400 | 404 | 413 | 422 => detect_kind(body).unwrap_or(RejectionKind::InvalidRequest),
        _ => detect_kind(body).unwrap_or(RejectionKind::Other),
    };

    CompletionError::Unretryable {
        status,
        kind,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(err: CompletionError) -> Option<RejectionKind> {
        match err {
            CompletionError::Unretryable { kind, .. } => Some(kind),
            _ => None,
        }
    }

    #[test]
    fn test_auth_status() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        let err = classify_failure(401, body);
        assert_eq!(kind_of(err.clone()), Some(RejectionKind::Auth));
        assert!(err.to_string().contains("invalid x-api-key"));
    }

    #[test]
    fn test_rate_limit_vs_quota_on_429() {
        let rate = classify_failure(429, r#"{"error":{"message":"Rate limit reached"}}"#);
        assert_eq!(kind_of(rate), Some(RejectionKind::RateLimit));

        let quota = classify_failure(
            429,
            r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota"}}"#,
        );
        assert_eq!(kind_of(quota), Some(RejectionKind::QuotaExceeded));
    }

    #[test]
    fn test_server_errors_are_transport() {
        let err = classify_failure(529, r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#);
        assert!(err.is_retryable());
        assert!(classify_failure(503, "").is_retryable());
        assert!(classify_failure(408, "timeout").is_retryable());
    }

    #[test]
    fn test_bad_request_detects_embedded_kind() {
        let err = classify_failure(400, r#"{"error":{"message":"Your credit balance is too low"}}"#);
        assert_eq!(kind_of(err), Some(RejectionKind::QuotaExceeded));

        let err = classify_failure(400, r#"{"error":{"message":"max_tokens: too large"}}"#);
        assert_eq!(kind_of(err), Some(RejectionKind::InvalidRequest));
    }

    #[test]
    fn test_plain_text_body_is_truncated() {
        let body = "x".repeat(1000);
        match classify_failure(418, &body) {
            CompletionError::Unretryable { message, kind, .. } => {
                assert_eq!(kind, RejectionKind::Other);
                assert!(message.len() < 400);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_body_message() {
        match classify_failure(403, "") {
            CompletionError::Unretryable { message, .. } => {
                assert_eq!(message, "no response body")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
