// Data models shared by the pipeline, the HTTP API and the poller

pub mod errors;
pub mod research;
pub mod state_machine;

pub use errors::ResearchError;
pub use research::{
    CreateJobRequest, CreateJobResponse, ErrorResponse, JobStatus, JobStatusResponse,
    ProgressEvent, ResearchJob, SubtaskAngle, SubtaskResult,
};
pub use state_machine::StateTransitionError;
