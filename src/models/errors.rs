// Error taxonomy for the research pipeline

use thiserror::Error;

use super::state_machine::StateTransitionError;

/// Every failure a caller of the pipeline, the HTTP API or the poller can observe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResearchError {
    /// Empty topic or malformed request; never enters the pipeline
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing credential or unusable settings; no job is created
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure or timeout that outlived its retry budget
    #[error("Transport error: {0}")]
    Transport(String),

    /// Auth, rate-limit or quota rejection from the completion service
    #[error("Completion service rejected the request: {0}")]
    UnretryableService(String),

    /// The completion service answered without extractable text
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    /// The caller lost contact with the job system; the job itself may be fine
    #[error("Polling failed after {failures} consecutive transport errors: {last_error}")]
    PollingFailed { failures: u32, last_error: String },

    /// The job reached the failed state; carries the job's error field
    #[error("Research job failed: {0}")]
    JobFailed(String),

    /// The job did not reach a terminal state within the polling budget
    #[error("Research job did not finish within {attempts} polling attempts")]
    Timeout { attempts: u32 },

    #[error("Research job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid job state change: {0}")]
    InvalidState(#[from] StateTransitionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResearchError {
    /// Errors the poller may retry within its consecutive-failure budget
    pub fn is_transport(&self) -> bool {
        matches!(self, ResearchError::Transport(_))
    }
}
