//! Retry logic with exponential backoff
//!
//! One parameterized policy shared by the completion client, the subtask
//! executor, the synthesizer and the job poller. The delay before attempt
//! `k` is `min(max_delay, initial_delay * multiplier^(k-1))`, plus an
//! optional uniform jitter in `[0, jitter_ms)`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, first attempt included (default: 3)
    pub max_attempts: u32,
    /// Base delay in milliseconds (default: 1000)
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds before jitter (default: 8000)
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
    /// Upper bound of the random offset added to each delay; 0 disables jitter
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 8000,
            backoff_multiplier: 2.0,
            jitter_ms: 0,
        }
    }
}

impl RetryConfig {
    /// Policy for single completion calls: 1s, 2s, 4s ... capped at 8s
    pub fn completion() -> Self {
        Self::default()
    }

    /// Policy for subtask and synthesis attempts: 4s before attempt 2, 8s before attempt 3
    pub fn subtask() -> Self {
        Self {
            initial_delay_ms: 2000,
            ..Self::default()
        }
    }

    /// Policy with no waiting between attempts (tests, dry runs)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            jitter_ms: 0,
        }
    }

    /// Deterministic part of the delay before `attempt` (1-based), in milliseconds
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        if !raw.is_finite() || raw >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            raw.round() as u64
        }
    }

    /// Full delay before `attempt` (1-based), jitter included
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_delay_ms(attempt) + jitter)
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// The final result (last error if every attempt failed)
    pub result: Result<T, E>,
    /// Number of attempts made
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    /// Whether more than one attempt was needed
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Execute an async operation with retry logic
///
/// `operation` receives the 1-based attempt number. Errors for which
/// `is_retryable` returns false end the loop immediately. `on_retry` is
/// invoked with the failed attempt number, its error and the upcoming delay.
pub async fn with_retry<F, Fut, T, E, P, R>(
    mut operation: F,
    config: &RetryConfig,
    is_retryable: P,
    mut on_retry: Option<R>,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    R: FnMut(u32, &E, Duration),
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(error) => {
                if attempts >= max_attempts || !is_retryable(&error) {
                    return RetryOutcome {
                        result: Err(error),
                        attempts,
                    };
                }

                let delay = config.delay_for_attempt(attempts + 1);
                log::warn!(
                    "Retryable error on attempt {}/{}: {}. Retrying in {}ms...",
                    attempts,
                    max_attempts,
                    error,
                    delay.as_millis()
                );

                if let Some(ref mut callback) = on_retry {
                    callback(attempts, &error, delay);
                }

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 8000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.jitter_ms, 0);
    }

    #[test]
    fn test_base_delay_grows_and_caps() {
        let config = RetryConfig::completion();
        assert_eq!(config.base_delay_ms(1), 1000);
        assert_eq!(config.base_delay_ms(2), 2000);
        assert_eq!(config.base_delay_ms(3), 4000);
        assert_eq!(config.base_delay_ms(4), 8000);
        assert_eq!(config.base_delay_ms(10), 8000);
    }

    #[test]
    fn test_subtask_delays_are_powers_of_two_seconds() {
        let config = RetryConfig::subtask();
        assert_eq!(config.base_delay_ms(2), 4000);
        assert_eq!(config.base_delay_ms(3), 8000);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 2000,
            max_delay_ms: 15000,
            backoff_multiplier: 1.2,
            jitter_ms: 500,
        };
        for attempt in 1..10 {
            let delay = config.delay_for_attempt(attempt).as_millis() as u64;
            let base = config.base_delay_ms(attempt);
            assert!(delay >= base && delay < base + 500);
        }
    }

    #[test]
    fn test_huge_attempt_number_does_not_overflow() {
        let config = RetryConfig::completion();
        assert_eq!(config.base_delay_ms(u32::MAX), 8000);
        assert_eq!(config.base_delay_ms(i32::MAX as u32 + 2), 8000);

        let poller_like = RetryConfig {
            max_attempts: u32::MAX,
            initial_delay_ms: 2000,
            max_delay_ms: 15000,
            backoff_multiplier: 1.2,
            jitter_ms: 0,
        };
        assert_eq!(poller_like.base_delay_ms(u32::MAX), 15000);
    }

    #[tokio::test]
    async fn test_with_retry_success_first_attempt() {
        let config = RetryConfig::immediate(3);
        let outcome = with_retry(
            |_| async { Ok::<_, String>(42) },
            &config,
            |_: &String| true,
            None::<fn(u32, &String, Duration)>,
        )
        .await;

        assert_eq!(outcome.result.as_ref().ok(), Some(&42));
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.was_retried());
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_on_last_attempt() {
        let config = RetryConfig::immediate(3);
        let calls = AtomicU32::new(0);
        let mut notices = Vec::new();

        let outcome = with_retry(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("connection reset".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            },
            &config,
            |_: &String| true,
            Some(|attempt: u32, _: &String, _: Duration| notices.push(attempt)),
        )
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(notices, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_fatal_error() {
        let config = RetryConfig::immediate(3);
        let outcome = with_retry(
            |_| async { Err::<i32, _>("invalid api key".to_string()) },
            &config,
            |e: &String| !e.contains("api key"),
            None::<fn(u32, &String, Duration)>,
        )
        .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_budget() {
        let config = RetryConfig::immediate(3);
        let outcome = with_retry(
            |_| async { Err::<i32, _>("timeout".to_string()) },
            &config,
            |_: &String| true,
            None::<fn(u32, &String, Duration)>,
        )
        .await;

        assert_eq!(outcome.result.as_ref().err().map(String::as_str), Some("timeout"));
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.was_retried());
    }
}
