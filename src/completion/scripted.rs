// Deterministic completion client that replays queued answers

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CompletionClient, CompletionError, CompletionRequest};
use crate::models::ResearchError;
use crate::utils::lock_mutex_recover;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync>;

/// Completion client for tests and offline runs.
///
/// Queued results are returned first, in order; once the queue is empty the
/// responder (if any) answers. Every request is recorded.
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
    configured: bool,
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            configured: true,
        }
    }

    /// Answer every unscripted call with `responder`
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Behave like a client with no credential
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn push_ok(&self, text: impl Into<String>) -> &Self {
        lock_mutex_recover(&self.script).push_back(Ok(text.into()));
        self
    }

    pub fn push_err(&self, err: CompletionError) -> &Self {
        lock_mutex_recover(&self.script).push_back(Err(err));
        self
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        lock_mutex_recover(&self.requests).len()
    }

    /// Copies of every request received, in arrival order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock_mutex_recover(&self.requests).clone()
    }
}

impl Default for ScriptedCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        lock_mutex_recover(&self.requests).push(request.clone());

        let queued = lock_mutex_recover(&self.script).pop_front();
        match queued {
            Some(result) => result,
            None => match self.responder {
                Some(ref responder) => responder(request),
                None => Err(CompletionError::Transport("script exhausted".to_string())),
            },
        }
    }

    fn ensure_configured(&self) -> Result<(), ResearchError> {
        if self.configured {
            Ok(())
        } else {
            Err(ResearchError::Configuration(
                "No API credential configured".to_string(),
            ))
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
