//! Research generation pipeline
//!
//! A topic is decomposed into three fixed angles, each angle is researched
//! through the completion client with retries and degradation, and the
//! outputs are recombined into one document. Progress is published to the
//! job registry and the event feed as the job advances.

pub mod decomposer;
pub mod executor;
pub mod prompts;
pub mod publisher;
pub mod service;
pub mod synthesizer;

pub use decomposer::{decompose, decompose_job, Decomposition, Subtask};
pub use executor::SubtaskExecutor;
pub use publisher::{HeartbeatHandle, ProgressPublisher};
pub use service::{JobSubscription, ResearchService};
pub use synthesizer::{concatenate, Synthesis, Synthesizer};
