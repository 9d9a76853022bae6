//! Subtask executor
//!
//! Runs each subtask through the completion client. A subtask gets the
//! normal attempts with backoff, then one degraded attempt with a short
//! prompt, then a static placeholder. Only an unretryable rejection or a
//! malformed response escapes as an error; transport failures are contained.

use futures_util::future::try_join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::{CompletionSettings, SubtaskSettings};
use crate::models::{ResearchError, SubtaskResult};
use crate::utils::retry::{with_retry, RetryConfig};

use super::decomposer::{Decomposition, Subtask};
use super::prompts::{placeholder_text, RESEARCHER_SYSTEM_PROMPT};
use super::publisher::ProgressPublisher;

pub struct SubtaskExecutor {
    client: Arc<dyn CompletionClient>,
    retry: RetryConfig,
    max_tokens: u32,
    degraded_max_tokens: u32,
    temperature: f32,
    parallel: bool,
}

impl SubtaskExecutor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        completion: &CompletionSettings,
        subtasks: &SubtaskSettings,
    ) -> Self {
        Self {
            client,
            retry: subtasks.retry.clone(),
            max_tokens: completion.max_tokens,
            degraded_max_tokens: completion.degraded_max_tokens,
            temperature: completion.temperature,
            parallel: subtasks.parallel,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run one subtask to a result. Transport exhaustion never returns Err.
    pub async fn run_subtask(
        &self,
        subtask: &Subtask,
        topic: &str,
        publisher: Option<&ProgressPublisher>,
    ) -> Result<SubtaskResult, ResearchError> {
        let label = subtask.label();
        log::info!("Running {} for '{}'", label, topic);

        let request =
            CompletionRequest::new(subtask.prompt.as_str(), self.max_tokens, self.temperature)
                .with_system(RESEARCHER_SYSTEM_PROMPT);

        let outcome = with_retry(
            |_| self.client.complete(&request),
            &self.retry,
            CompletionError::is_retryable,
            Some(|attempt: u32, _: &CompletionError, delay: Duration| {
                log::debug!("{} attempt {} failed, next in {:?}", label, attempt, delay);
                if let Some(publisher) = publisher {
                    publisher.nudge(&format!("Retrying {} (attempt {} failed)", label, attempt));
                }
            }),
        )
        .await;

        let attempts = outcome.attempts;
        let retried = outcome.was_retried();
        let error = match outcome.result {
            Ok(text) => {
                if retried {
                    log::info!("{} succeeded after {} attempts", label, attempts);
                }
                return Ok(self.result(subtask, text, false, attempts));
            }
            Err(e) if !e.is_retryable() => {
                log::error!("{} rejected by completion service: {}", label, e);
                return Err(e.into());
            }
            Err(e) => e,
        };

        log::warn!(
            "{} exhausted {} attempts ({}), trying degraded prompt",
            label,
            attempts,
            error
        );
        if let Some(publisher) = publisher {
            publisher.nudge(&format!("Simplifying {}", label));
        }

        let degraded = CompletionRequest::new(
            subtask.degraded_prompt.as_str(),
            self.degraded_max_tokens,
            self.temperature,
        );
        match self.client.complete(&degraded).await {
            Ok(text) => {
                log::info!("{} answered by degraded prompt", label);
                Ok(self.result(subtask, text, true, attempts + 1))
            }
            Err(e) if !e.is_retryable() => {
                log::error!("{} degraded attempt rejected: {}", label, e);
                Err(e.into())
            }
            Err(e) => {
                log::error!("{} could not be researched, using placeholder: {}", label, e);
                Ok(self.result(
                    subtask,
                    placeholder_text(subtask.angle, topic),
                    true,
                    attempts + 1,
                ))
            }
        }
    }

    fn result(&self, subtask: &Subtask, text: String, degraded: bool, attempts: u32) -> SubtaskResult {
        SubtaskResult {
            index: subtask.index(),
            angle: subtask.angle,
            text,
            degraded,
            attempts,
        }
    }

    /// [`Self::run_subtask`] plus the shared completion count and its milestone
    async fn run_counted(
        &self,
        subtask: &Subtask,
        topic: &str,
        done: &AtomicUsize,
        total: usize,
        publisher: Option<&ProgressPublisher>,
    ) -> Result<SubtaskResult, ResearchError> {
        let result = self.run_subtask(subtask, topic, publisher).await?;
        let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(publisher) = publisher {
            publisher.subtask_finished(finished, total, &subtask.label());
        }
        Ok(result)
    }

    /// Run every subtask of a decomposition; results are ordered by index
    pub async fn run_all(
        &self,
        decomposition: &Decomposition,
        publisher: Option<&ProgressPublisher>,
    ) -> Result<Vec<SubtaskResult>, ResearchError> {
        let total = decomposition.subtasks.len();
        let done = AtomicUsize::new(0);
        let topic = decomposition.topic.as_str();

        let mut results = if self.parallel {
            log::info!("Running {} subtasks in parallel", total);
            try_join_all(
                decomposition
                    .subtasks
                    .iter()
                    .map(|subtask| self.run_counted(subtask, topic, &done, total, publisher)),
            )
            .await?
        } else {
            log::info!("Running {} subtasks sequentially", total);
            let mut results = Vec::with_capacity(total);
            for subtask in decomposition.subtasks.iter() {
                results.push(
                    self.run_counted(subtask, topic, &done, total, publisher)
                        .await?,
                );
            }
            results
        };

        results.sort_by_key(|r| r.index);

        let degraded = results.iter().filter(|r| r.degraded).count();
        if degraded > 0 {
            log::warn!("{} of {} subtasks degraded", degraded, total);
        }
        Ok(results)
    }
}
