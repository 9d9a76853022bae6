//! In-memory job registry
//!
//! Each job lives in its own `watch` channel. Every mutation goes through
//! `send_if_modified`, which serializes writers per job and lets readers
//! (status polls, event streams) observe the latest state without blocking
//! the writer. Terminal jobs reject further writes.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::state_machine::transition_state;
use crate::models::{
    CreateJobRequest, JobStatus, JobStatusResponse, ResearchError, ResearchJob,
    StateTransitionError,
};
use crate::utils::{read_recover, write_recover};

/// Highest progress a job can report before it is completed
pub const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

/// Registry of research jobs keyed by job id
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, watch::Sender<ResearchJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Validate the request and register a pending job
    pub fn create_job(&self, request: &CreateJobRequest) -> Result<ResearchJob, ResearchError> {
        request.validate().map_err(ResearchError::Validation)?;

        let job_id = format!("research-{}", Uuid::new_v4());
        let job = ResearchJob::new(job_id.clone(), request);
        let (tx, _rx) = watch::channel(job.clone());

        write_recover(&self.jobs).insert(job_id.clone(), tx);
        log::info!("Registered research job {} for topic '{}'", job_id, job.topic);

        Ok(job)
    }

    fn with_sender<T>(
        &self,
        job_id: &str,
        f: impl FnOnce(&watch::Sender<ResearchJob>) -> T,
    ) -> Result<T, ResearchError> {
        let jobs = read_recover(&self.jobs);
        let tx = jobs
            .get(job_id)
            .ok_or_else(|| ResearchError::JobNotFound(job_id.to_string()))?;
        Ok(f(tx))
    }

    /// Snapshot of a job
    pub fn get(&self, job_id: &str) -> Result<ResearchJob, ResearchError> {
        self.with_sender(job_id, |tx| tx.borrow().clone())
    }

    /// Wire status of a job; identical on every read once terminal
    pub fn get_status(&self, job_id: &str) -> Result<JobStatusResponse, ResearchError> {
        self.with_sender(job_id, |tx| tx.borrow().to_status_response())
    }

    /// Receiver that observes every committed change of a job
    pub fn subscribe(&self, job_id: &str) -> Result<watch::Receiver<ResearchJob>, ResearchError> {
        self.with_sender(job_id, |tx| tx.subscribe())
    }

    pub fn is_terminal(&self, job_id: &str) -> bool {
        self.with_sender(job_id, |tx| tx.borrow().is_terminal())
            .unwrap_or(true)
    }

    /// Move a pending job to processing
    pub fn start_processing(&self, job_id: &str, message: &str) -> Result<(), ResearchError> {
        self.transition(job_id, JobStatus::Processing, |job| {
            job.message = message.to_string();
        })
    }

    /// Record progress and return the committed value. `None` means the
    /// write was suppressed because the value does not advance or the job
    /// is already terminal.
    pub fn update_progress(
        &self,
        job_id: &str,
        percent: u8,
        message: &str,
    ) -> Result<Option<u8>, ResearchError> {
        let percent = percent.min(MAX_IN_FLIGHT_PROGRESS);

        self.with_sender(job_id, |tx| {
            let committed = tx.send_if_modified(|job| {
                if job.is_terminal() || percent <= job.progress {
                    return false;
                }
                job.progress = percent;
                job.message = message.to_string();
                job.updated_at = Utc::now();
                true
            });
            committed.then_some(percent)
        })
    }

    /// Mark a processing job completed with its document
    pub fn complete(&self, job_id: &str, result: String) -> Result<(), ResearchError> {
        self.transition(job_id, JobStatus::Completed, move |job| {
            job.progress = 100;
            job.message = "Research complete".to_string();
            job.result = Some(result);
            job.error = None;
        })?;
        log::info!("Research job {} completed", job_id);
        Ok(())
    }

    /// Mark a job failed with a human-readable cause
    pub fn fail(&self, job_id: &str, error: String) -> Result<(), ResearchError> {
        let cause = error.clone();
        self.transition(job_id, JobStatus::Failed, move |job| {
            job.message = "Research failed".to_string();
            job.error = Some(error);
            job.result = None;
        })?;
        log::error!("Research job {} failed: {}", job_id, cause);
        Ok(())
    }

    /// Validated status change applied atomically with `apply`
    fn transition(
        &self,
        job_id: &str,
        target: JobStatus,
        apply: impl FnOnce(&mut ResearchJob),
    ) -> Result<(), ResearchError> {
        let mut outcome: Result<(), StateTransitionError> = Ok(());

        self.with_sender(job_id, |tx| {
            tx.send_if_modified(|job| match transition_state(job.status, target) {
                Ok(status) => {
                    job.status = status;
                    job.updated_at = Utc::now();
                    apply(job);
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            })
        })?;

        outcome.map_err(ResearchError::from)
    }

    /// Ids of jobs that are still pending or processing
    pub fn in_flight_ids(&self) -> Vec<String> {
        read_recover(&self.jobs)
            .iter()
            .filter(|(_, tx)| !tx.borrow().is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        read_recover(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_job() -> (JobRegistry, String) {
        let registry = JobRegistry::new();
        let job = registry
            .create_job(&CreateJobRequest::new("industry trends"))
            .unwrap();
        (registry, job.id)
    }

    #[test]
    fn test_create_rejects_blank_topic_without_registering() {
        let registry = JobRegistry::new();
        let err = registry.create_job(&CreateJobRequest::new("  ")).unwrap_err();
        assert!(matches!(err, ResearchError::Validation(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let registry = JobRegistry::new();
        let a = registry.create_job(&CreateJobRequest::new("a")).unwrap();
        let b = registry.create_job(&CreateJobRequest::new("b")).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("research-"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.get_status("missing"),
            Err(ResearchError::JobNotFound(_))
        ));
        assert!(registry.is_terminal("missing"));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let (registry, id) = registry_with_job();
        registry.start_processing(&id, "Working").unwrap();

        assert_eq!(registry.update_progress(&id, 20, "Subtasks").unwrap(), Some(20));
        assert_eq!(registry.update_progress(&id, 20, "Duplicate").unwrap(), None);
        assert_eq!(registry.update_progress(&id, 10, "Lower").unwrap(), None);

        let job = registry.get(&id).unwrap();
        assert_eq!(job.progress, 20);
        assert_eq!(job.message, "Subtasks");
    }

    #[test]
    fn test_in_flight_progress_capped_below_completion() {
        let (registry, id) = registry_with_job();
        registry.start_processing(&id, "Working").unwrap();
        assert_eq!(
            registry.update_progress(&id, 100, "Almost").unwrap(),
            Some(MAX_IN_FLIGHT_PROGRESS)
        );
        assert_eq!(registry.get(&id).unwrap().progress, MAX_IN_FLIGHT_PROGRESS);
    }

    #[test]
    fn test_complete_sets_result_and_is_terminal() {
        let (registry, id) = registry_with_job();
        registry.start_processing(&id, "Working").unwrap();
        registry.complete(&id, "# Report".to_string()).unwrap();

        let status = registry.get_status(&id).unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.progress, Some(100));
        assert_eq!(status.research.as_deref(), Some("# Report"));
        assert!(status.error.is_none());
    }

    #[test]
    fn test_writes_after_terminal_are_rejected() {
        let (registry, id) = registry_with_job();
        registry.start_processing(&id, "Working").unwrap();
        registry.fail(&id, "quota exceeded".to_string()).unwrap();
        let before = registry.get_status(&id).unwrap();

        assert_eq!(registry.update_progress(&id, 50, "late").unwrap(), None);
        assert!(matches!(
            registry.complete(&id, "late".to_string()),
            Err(ResearchError::InvalidState(_))
        ));
        assert!(registry.fail(&id, "again".to_string()).is_err());

        // Idempotent terminal reads
        for _ in 0..3 {
            assert_eq!(registry.get_status(&id).unwrap(), before);
        }
        assert_eq!(before.error.as_deref(), Some("quota exceeded"));
        assert!(before.research.is_none());
    }

    #[test]
    fn test_pending_cannot_complete() {
        let (registry, id) = registry_with_job();
        assert!(registry.complete(&id, "doc".to_string()).is_err());
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let (registry, id) = registry_with_job();
        let mut rx = registry.subscribe(&id).unwrap();

        registry.start_processing(&id, "Working").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, JobStatus::Processing);

        // Suppressed writes do not wake subscribers
        registry.update_progress(&id, 0, "noop").unwrap();
        assert!(!rx.has_changed().unwrap());
    }
}
