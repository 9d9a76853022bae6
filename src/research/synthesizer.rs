// Recombination synthesizer - merges subtask outputs into the final document

use std::sync::Arc;
use std::time::Duration;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::config::SynthesisSettings;
use crate::models::{ResearchError, SubtaskResult};
use crate::utils::retry::{with_retry, RetryConfig};

use super::decomposer::Decomposition;
use super::prompts::{build_synthesis_prompt, SYNTHESIZER_SYSTEM_PROMPT};
use super::publisher::ProgressPublisher;

/// Final document and how it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub document: String,
    /// True when the completion service could not be reached and the
    /// subtask outputs were concatenated instead
    pub fallback_used: bool,
    pub attempts: u32,
}

pub struct Synthesizer {
    client: Arc<dyn CompletionClient>,
    retry: RetryConfig,
    max_tokens: u32,
    temperature: f32,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn CompletionClient>, synthesis: &SynthesisSettings) -> Self {
        Self {
            client,
            retry: synthesis.retry.clone(),
            max_tokens: synthesis.max_tokens,
            temperature: synthesis.temperature,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Recombine subtask outputs. Transport exhaustion falls back to
    /// [`concatenate`]; unretryable rejections and malformed responses fail.
    pub async fn synthesize(
        &self,
        decomposition: &Decomposition,
        results: &[SubtaskResult],
        publisher: Option<&ProgressPublisher>,
    ) -> Result<Synthesis, ResearchError> {
        let prompt = build_synthesis_prompt(&decomposition.recombination_template, results);
        let request = CompletionRequest::new(prompt, self.max_tokens, self.temperature)
            .with_system(SYNTHESIZER_SYSTEM_PROMPT);

        log::info!(
            "Synthesizing {} subtask results for '{}'",
            results.len(),
            decomposition.topic
        );

        let outcome = with_retry(
            |_| self.client.complete(&request),
            &self.retry,
            CompletionError::is_retryable,
            Some(|attempt: u32, _: &CompletionError, _: Duration| {
                if let Some(publisher) = publisher {
                    publisher.nudge(&format!("Retrying synthesis (attempt {} failed)", attempt));
                }
            }),
        )
        .await;

        match outcome.result {
            Ok(document) => Ok(Synthesis {
                document,
                fallback_used: false,
                attempts: outcome.attempts,
            }),
            Err(e) if !e.is_retryable() => {
                log::error!("Synthesis rejected by completion service: {}", e);
                Err(e.into())
            }
            Err(e) => {
                log::warn!(
                    "Synthesis exhausted {} attempts ({}), concatenating subtask results",
                    outcome.attempts,
                    e
                );
                Ok(Synthesis {
                    document: concatenate(&decomposition.topic, results),
                    fallback_used: true,
                    attempts: outcome.attempts,
                })
            }
        }
    }
}

/// Deterministic document built from the raw subtask outputs.
/// Always well-formed, whatever the inputs.
pub fn concatenate(topic: &str, results: &[SubtaskResult]) -> String {
    let mut ordered: Vec<&SubtaskResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.index);

    let degraded = ordered.iter().filter(|r| r.degraded).count();

    let mut document = format!("# Research: {}\n\n## Executive Summary\n\n", topic);
    document.push_str(&format!(
        "This document combines {} independent research notes on \"{}\". \
         Automatic synthesis was unavailable, so each note is reproduced below under its own heading.",
        ordered.len(),
        topic
    ));
    if degraded > 0 {
        document.push_str(&format!(
            " {} of {} sections are limited or could not be researched.",
            degraded,
            ordered.len()
        ));
    }
    document.push_str("\n\n");

    for result in ordered {
        let text = result.text.trim();
        document.push_str(&format!(
            "## {}. {} - {}\n\n{}\n\n",
            result.index + 1,
            result.angle.title(),
            topic,
            if text.is_empty() { "_No content._" } else { text }
        ));
    }

    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{RejectionKind, ScriptedCompletionClient};
    use crate::models::SubtaskAngle;
    use crate::research::decomposer::decompose;

    fn results() -> Vec<SubtaskResult> {
        SubtaskAngle::all()
            .iter()
            .map(|angle| SubtaskResult {
                index: angle.index(),
                angle: *angle,
                text: format!("text for {}", angle.as_str()),
                degraded: false,
                attempts: 1,
            })
            .collect()
    }

    fn synthesizer(client: Arc<ScriptedCompletionClient>) -> Synthesizer {
        Synthesizer::new(client, &SynthesisSettings::default()).with_retry(RetryConfig::immediate(3))
    }

    #[tokio::test]
    async fn test_synthesis_uses_completion_output() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_ok("# Final document");
        let decomposition = decompose("industry trends", "", None, &[]);

        let synthesis = synthesizer(client.clone())
            .synthesize(&decomposition, &results(), None)
            .await
            .unwrap();

        assert_eq!(synthesis.document, "# Final document");
        assert!(!synthesis.fallback_used);
        let prompt = &client.requests()[0].prompt;
        assert!(prompt.contains("text for market_facts"));
        assert!(prompt.contains("text for competitive_landscape"));
    }

    #[tokio::test]
    async fn test_exhaustion_falls_back_to_concatenation() {
        let client = Arc::new(ScriptedCompletionClient::new());
        let decomposition = decompose("industry trends", "", None, &[]);

        let synthesis = synthesizer(client.clone())
            .synthesize(&decomposition, &results(), None)
            .await
            .unwrap();

        assert!(synthesis.fallback_used);
        assert_eq!(synthesis.attempts, 3);
        assert_eq!(client.call_count(), 3);
        for result in results() {
            assert!(synthesis.document.contains(&result.text));
            assert!(synthesis.document.contains(result.angle.title()));
        }
    }

    #[tokio::test]
    async fn test_rejection_is_fatal() {
        let client = Arc::new(ScriptedCompletionClient::new());
        client.push_err(CompletionError::Unretryable {
            status: 401,
            kind: RejectionKind::Auth,
            message: "invalid x-api-key".to_string(),
        });
        let decomposition = decompose("industry trends", "", None, &[]);

        let err = synthesizer(client.clone())
            .synthesize(&decomposition, &results(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::UnretryableService(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn test_concatenate_distinct_headings() {
        let document = concatenate("industry trends", &results());
        assert!(document.starts_with("# Research: industry trends"));
        assert!(document.contains("## Executive Summary"));
        assert!(document.contains("## 1. Current Facts & Market Data - industry trends"));
        assert!(document.contains("## 2. Audience & Pain-Point Analysis - industry trends"));
        assert!(document.contains("## 3. Competitive Landscape & Best Practices - industry trends"));
    }

    #[test]
    fn test_concatenate_handles_degraded_and_empty_input() {
        let mut input = results();
        input.reverse();
        input[0].degraded = true;
        input[0].text = "   ".to_string();
        let document = concatenate("t", &input);
        assert!(document.contains("1 of 3 sections"));
        assert!(document.contains("_No content._"));
        // Sorted back into angle order
        let first = document.find("## 1.").unwrap();
        let third = document.find("## 3.").unwrap();
        assert!(first < third);

        let empty = concatenate("t", &[]);
        assert!(empty.contains("## Executive Summary"));
    }
}
