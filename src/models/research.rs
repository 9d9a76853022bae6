// Research job models shared by the pipeline, the HTTP API and the poller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Job Status
// ============================================================================

/// Lifecycle of a research job: pending -> processing -> completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!(
                "Invalid job status: '{}'. Expected 'pending', 'processing', 'completed' or 'failed'",
                s
            )),
        }
    }
}

// ============================================================================
// Research Job
// ============================================================================

/// A unit of asynchronous research work, identified by an opaque id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchJob {
    pub id: String,
    pub topic: String,
    pub context: String,
    /// Preferred references supplied by the caller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Named entity (company, product) that needs targeted lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub status: JobStatus,
    /// 0-100, never decreases
    pub progress: u8,
    /// Latest human-readable progress message
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchJob {
    /// Create a pending job from an already validated request
    pub fn new(id: String, request: &CreateJobRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            topic: request.topic.trim().to_string(),
            context: request.context.clone().unwrap_or_default(),
            sources: request.sources.clone().unwrap_or_default(),
            entity: request
                .entity
                .as_ref()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            status: JobStatus::Pending,
            progress: 0,
            message: "Job created".to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wire representation returned by the status endpoint
    pub fn to_status_response(&self) -> JobStatusResponse {
        JobStatusResponse {
            status: self.status,
            progress: Some(self.progress),
            message: Some(self.message.clone()),
            research: self.result.clone(),
            error: self.error.clone(),
        }
    }

    /// Current progress as an event
    pub fn progress_event(&self) -> ProgressEvent {
        ProgressEvent::new(self.progress, self.message.clone())
    }
}

// ============================================================================
// Subtasks
// ============================================================================

/// The three fixed, orthogonal research angles a topic is split into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskAngle {
    MarketFacts,
    AudienceAnalysis,
    CompetitiveLandscape,
}

impl SubtaskAngle {
    /// Execution order: facts -> audience -> competitive
    pub fn all() -> [SubtaskAngle; 3] {
        [
            SubtaskAngle::MarketFacts,
            SubtaskAngle::AudienceAnalysis,
            SubtaskAngle::CompetitiveLandscape,
        ]
    }

    pub fn index(&self) -> usize {
        match self {
            SubtaskAngle::MarketFacts => 0,
            SubtaskAngle::AudienceAnalysis => 1,
            SubtaskAngle::CompetitiveLandscape => 2,
        }
    }

    /// Heading used in prompts and in the concatenation fallback
    pub fn title(&self) -> &'static str {
        match self {
            SubtaskAngle::MarketFacts => "Current Facts & Market Data",
            SubtaskAngle::AudienceAnalysis => "Audience & Pain-Point Analysis",
            SubtaskAngle::CompetitiveLandscape => "Competitive Landscape & Best Practices",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskAngle::MarketFacts => "market_facts",
            SubtaskAngle::AudienceAnalysis => "audience_analysis",
            SubtaskAngle::CompetitiveLandscape => "competitive_landscape",
        }
    }
}

impl std::fmt::Display for SubtaskAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of one subtask, held only for the duration of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskResult {
    pub index: usize,
    pub angle: SubtaskAngle,
    /// Research text, or a placeholder when every attempt failed
    pub text: String,
    /// True when the primary prompt did not succeed
    pub degraded: bool,
    /// Completion calls spent on this subtask, degraded attempt included
    pub attempts: u32,
}

// ============================================================================
// Progress
// ============================================================================

/// Progress notification, identical for streamed and polled observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: u8,
    /// Human-readable status
    #[serde(rename = "status", alias = "message")]
    pub message: String,
}

impl ProgressEvent {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Job creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Explicit named entity needing targeted lookup (company, product, person)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl CreateJobRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Reject empty or whitespace-only topics
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("Topic must not be empty".to_string());
        }
        Ok(())
    }
}

/// Job creation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
}

/// Job status response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body returned by the HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_status_from_str() {
        assert_eq!("COMPLETED".parse::<JobStatus>(), Ok(JobStatus::Completed));
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_topic() {
        assert!(CreateJobRequest::new("").validate().is_err());
        assert!(CreateJobRequest::new("   \t").validate().is_err());
        assert!(CreateJobRequest::new("industry trends").validate().is_ok());
    }

    #[test]
    fn test_new_job_trims_and_drops_blank_entity() {
        let request = CreateJobRequest::new("  saas pricing ").with_entity("  ");
        let job = ResearchJob::new("research-1".to_string(), &request);
        assert_eq!(job.topic, "saas pricing");
        assert_eq!(job.entity, None);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.context, "");
    }

    #[test]
    fn test_create_request_deserializes_minimal_body() {
        let request: CreateJobRequest =
            serde_json::from_str(r#"{"topic":"industry trends"}"#).unwrap();
        assert_eq!(request.topic, "industry trends");
        assert!(request.context.is_none());
        assert!(request.sources.is_none());
    }

    #[test]
    fn test_status_response_wire_shape() {
        let response = JobStatusResponse {
            status: JobStatus::Completed,
            progress: Some(100),
            message: None,
            research: Some("# Report".to_string()),
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["research"], "# Report");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_progress_event_serializes_message_as_status() {
        let event = ProgressEvent::new(150, "Finalizing");
        assert_eq!(event.percent, 100);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "Finalizing");
    }

    #[test]
    fn test_subtask_angles_are_ordered() {
        let angles = SubtaskAngle::all();
        for (i, angle) in angles.iter().enumerate() {
            assert_eq!(angle.index(), i);
        }
    }
}
