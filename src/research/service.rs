//! Research job orchestration
//!
//! `ResearchService` owns the registry and the completion client. Creating a
//! job validates the request, checks the credential, registers the job and
//! spawns its worker. The worker runs three phases (decompose, research
//! subtasks, synthesize) and writes exactly one terminal state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::completion::CompletionClient;
use crate::config::PipelineConfig;
use crate::jobs::{JobRegistry, MAX_IN_FLIGHT_PROGRESS};
use crate::models::{CreateJobRequest, JobStatusResponse, ResearchError, ResearchJob};
use crate::server::EventBroadcaster;

use super::decomposer::decompose_job;
use super::executor::SubtaskExecutor;
use super::publisher::{
    subtask_milestone, ProgressPublisher, ACCEPTED, FINALIZING, QUERY_BUILT, SUBTASKS_END,
    SUBTASKS_START,
};
use super::synthesizer::Synthesizer;

/// A freshly created job together with a receiver opened before its worker ran
pub struct JobSubscription {
    pub job_id: String,
    /// State right after acceptance
    pub snapshot: ResearchJob,
    pub receiver: watch::Receiver<ResearchJob>,
}

/// Entry point for creating and observing research jobs
#[derive(Clone)]
pub struct ResearchService {
    registry: Arc<JobRegistry>,
    client: Arc<dyn CompletionClient>,
    config: Arc<PipelineConfig>,
    broadcaster: Option<Arc<EventBroadcaster>>,
}

impl ResearchService {
    pub fn new(client: Arc<dyn CompletionClient>, config: PipelineConfig) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            client,
            config: Arc::new(config),
            broadcaster: None,
        }
    }

    /// Mirror job events to WebSocket clients
    pub fn with_broadcaster(mut self, broadcaster: Arc<EventBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Name of the completion backend, for logs and the version endpoint
    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    fn publisher(&self, job_id: &str) -> ProgressPublisher {
        ProgressPublisher::new(self.registry.clone(), self.broadcaster.clone(), job_id)
    }

    /// Register a job and start it in the background.
    ///
    /// Validation and credential errors are returned before any job exists,
    /// and nothing is sent to the completion service. Must be called from
    /// within a tokio runtime.
    pub fn create_job(&self, request: &CreateJobRequest) -> Result<String, ResearchError> {
        let job = self.register(request)?;
        self.spawn_worker(&job.id);
        Ok(job.id)
    }

    /// Like [`Self::create_job`], but the receiver and the accepted snapshot
    /// are taken before the worker starts, so no progress is missed.
    pub fn create_job_subscribed(
        &self,
        request: &CreateJobRequest,
    ) -> Result<JobSubscription, ResearchError> {
        let job = self.register(request)?;
        let mut receiver = self.registry.subscribe(&job.id)?;
        let snapshot = receiver.borrow_and_update().clone();
        self.spawn_worker(&job.id);

        Ok(JobSubscription {
            job_id: job.id,
            snapshot,
            receiver,
        })
    }

    fn register(&self, request: &CreateJobRequest) -> Result<ResearchJob, ResearchError> {
        request.validate().map_err(ResearchError::Validation)?;
        self.client.ensure_configured()?;

        let job = self.registry.create_job(request)?;
        self.publisher(&job.id).publish(ACCEPTED, "Research job accepted");
        Ok(job)
    }

    fn spawn_worker(&self, job_id: &str) {
        let service = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            service.run_job(&job_id).await;
        });
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobStatusResponse, ResearchError> {
        self.registry.get_status(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Result<ResearchJob, ResearchError> {
        self.registry.get(job_id)
    }

    pub fn subscribe(&self, job_id: &str) -> Result<watch::Receiver<ResearchJob>, ResearchError> {
        self.registry.subscribe(job_id)
    }

    /// Run a registered job to its terminal state
    pub async fn run_job(&self, job_id: &str) {
        let publisher = Arc::new(self.publisher(job_id));

        let written = match self.execute(job_id, &publisher).await {
            Ok(document) => publisher.complete(document),
            Err(e) => publisher.fail(&e.to_string()),
        };

        if let Err(e) = written {
            log::warn!("[{}] Could not record terminal state: {}", job_id, e);
        }
    }

    async fn execute(
        &self,
        job_id: &str,
        publisher: &Arc<ProgressPublisher>,
    ) -> Result<String, ResearchError> {
        let job = self.registry.get(job_id)?;
        self.registry
            .start_processing(job_id, "Building research query")?;

        // Phase 1: decompose
        log::info!("[{}] Phase 1: Decomposing '{}'", job_id, job.topic);
        let decomposition = decompose_job(&job);
        publisher.publish(QUERY_BUILT, "Research query built");

        // Phase 2: research subtasks
        let total = decomposition.subtasks.len();
        log::info!("[{}] Phase 2: Researching {} angles", job_id, total);
        publisher.publish(
            SUBTASKS_START,
            &format!("Researching {} angles", total),
        );
        publisher.set_ceiling(subtask_milestone(1, total).saturating_sub(1));

        let interval_ms = self.config.progress.heartbeat_interval_ms;
        let heartbeat = (interval_ms > 0).then(|| {
            publisher.start_heartbeat(Duration::from_millis(interval_ms), "Researching")
        });

        let executor = SubtaskExecutor::new(
            self.client.clone(),
            &self.config.completion,
            &self.config.subtasks,
        );
        let results = executor
            .run_all(&decomposition, Some(publisher.as_ref()))
            .await?;
        publisher.publish(SUBTASKS_END, "All angles researched");

        // Phase 3: synthesize
        log::info!("[{}] Phase 3: Synthesizing final document", job_id);
        publisher.publish(FINALIZING, "Synthesizing final document");
        publisher.set_ceiling(MAX_IN_FLIGHT_PROGRESS);

        let synthesizer = Synthesizer::new(self.client.clone(), &self.config.synthesis);
        let synthesis = synthesizer
            .synthesize(&decomposition, &results, Some(publisher.as_ref()))
            .await?;
        drop(heartbeat);

        if synthesis.fallback_used {
            log::warn!("[{}] Completed with concatenated fallback document", job_id);
        }
        Ok(synthesis.document)
    }
}
