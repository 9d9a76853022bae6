//! Caller-side job poller
//!
//! Creates a job through a [`JobApi`] and checks its status on a jittered,
//! growing delay schedule until it completes, fails, runs out of attempts or
//! loses contact with the job system too many times in a row.

pub mod http;

pub use http::HttpJobApi;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::PollerSettings;
use crate::models::{CreateJobRequest, JobStatus, JobStatusResponse, ProgressEvent, ResearchError};
use crate::research::ResearchService;

/// The two calls the poller needs from a job system
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String, ResearchError>;

    async fn get_status(&self, job_id: &str) -> Result<JobStatusResponse, ResearchError>;
}

/// In-process job system
#[async_trait]
impl JobApi for ResearchService {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String, ResearchError> {
        ResearchService::create_job(self, request)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatusResponse, ResearchError> {
        ResearchService::get_status(self, job_id)
    }
}

pub struct JobPoller {
    api: Arc<dyn JobApi>,
    settings: PollerSettings,
    progress_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl JobPoller {
    pub fn new(api: Arc<dyn JobApi>, settings: PollerSettings) -> Self {
        Self {
            api,
            settings,
            progress_tx: None,
        }
    }

    /// Forward progress to a local observer
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    fn emit(&self, last: &mut Option<u8>, event: ProgressEvent) {
        if last.is_some_and(|p| event.percent <= p) {
            return;
        }
        *last = Some(event.percent);
        if let Some(ref tx) = self.progress_tx {
            // Observer gone; keep polling regardless
            let _ = tx.send(event);
        }
    }

    /// Create a job and wait for its document
    pub async fn create_and_await(&self, request: &CreateJobRequest) -> Result<String, ResearchError> {
        let job_id = self.api.create_job(request).await?;
        log::info!("Created research job {}", job_id);
        self.await_job(&job_id, self.settings.max_attempts).await
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// Returns the document on completion, `JobFailed` with the job's error
    /// on failure, `Timeout` after `max_attempts` checks and `PollingFailed`
    /// when transport errors exhaust the consecutive-failure budget.
    pub async fn await_job(&self, job_id: &str, max_attempts: u32) -> Result<String, ResearchError> {
        let schedule = self.settings.delay_schedule();
        let budget = self.settings.max_consecutive_failures.max(1);
        let mut consecutive_failures = 0u32;
        let mut last_percent: Option<u8> = None;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(schedule.delay_for_attempt(attempt)).await;

            let status = match self.api.get_status(job_id).await {
                Ok(status) => {
                    consecutive_failures = 0;
                    status
                }
                Err(e) if e.is_transport() => {
                    consecutive_failures += 1;
                    if consecutive_failures >= budget {
                        log::error!(
                            "Lost contact with job {} after {} consecutive failures",
                            job_id,
                            consecutive_failures
                        );
                        return Err(ResearchError::PollingFailed {
                            failures: consecutive_failures,
                            last_error: e.to_string(),
                        });
                    }
                    log::warn!(
                        "Status check {}/{} for {} failed ({}/{} consecutive): {}",
                        attempt,
                        max_attempts,
                        job_id,
                        consecutive_failures,
                        budget,
                        e
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            match status.status {
                JobStatus::Completed => {
                    let document = status.research.ok_or_else(|| {
                        ResearchError::MalformedResponse(format!(
                            "job {} completed without a document",
                            job_id
                        ))
                    })?;
                    self.emit(&mut last_percent, ProgressEvent::new(100, "Research complete"));
                    return Ok(document);
                }
                JobStatus::Failed => {
                    let error = status
                        .error
                        .unwrap_or_else(|| "job failed without an error message".to_string());
                    return Err(ResearchError::JobFailed(error));
                }
                JobStatus::Pending | JobStatus::Processing => {
                    let percent = status.progress.unwrap_or(0);
                    let message = status
                        .message
                        .unwrap_or_else(|| status.status.as_str().to_string());
                    log::debug!("Job {} at {}%: {}", job_id, percent, message);
                    self.emit(&mut last_percent, ProgressEvent::new(percent, message));
                }
            }
        }

        log::warn!("Job {} still running after {} status checks", job_id, max_attempts);
        Err(ResearchError::Timeout {
            attempts: max_attempts,
        })
    }
}
