//! Progress publisher
//!
//! Turns pipeline milestones into monotonic progress writes on the job
//! registry and mirrors them to the WebSocket event feed. While a long call
//! is in flight a [`HeartbeatHandle`] keeps nudging progress forward so
//! observers always see motion, never past the next milestone.

use serde_json::json;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::jobs::JobRegistry;
use crate::models::ResearchError;
use crate::server::EventBroadcaster;

/// Job accepted by the service
pub const ACCEPTED: u8 = 5;
/// Subtask prompts built
pub const QUERY_BUILT: u8 = 15;
/// First subtask started
pub const SUBTASKS_START: u8 = 20;
/// Last subtask finished
pub const SUBTASKS_END: u8 = 90;
/// Synthesis under way
pub const FINALIZING: u8 = 95;

/// Percent reached once `done` of `total` subtasks have finished
pub fn subtask_milestone(done: usize, total: usize) -> u8 {
    if total == 0 {
        return SUBTASKS_END;
    }
    let span = (SUBTASKS_END - SUBTASKS_START) as usize;
    SUBTASKS_START + (span * done.min(total) / total) as u8
}

/// Publishes progress for one job
pub struct ProgressPublisher {
    registry: Arc<JobRegistry>,
    broadcaster: Option<Arc<EventBroadcaster>>,
    job_id: String,
    /// Heartbeats never go beyond this value
    ceiling: AtomicU8,
}

impl ProgressPublisher {
    pub fn new(
        registry: Arc<JobRegistry>,
        broadcaster: Option<Arc<EventBroadcaster>>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            job_id: job_id.into(),
            ceiling: AtomicU8::new(QUERY_BUILT - 1),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn current(&self) -> u8 {
        self.registry
            .get(&self.job_id)
            .map(|job| job.progress)
            .unwrap_or(0)
    }

    pub fn is_terminal(&self) -> bool {
        self.registry.is_terminal(&self.job_id)
    }

    /// Publish `percent` if it advances the job. Duplicate or lower values,
    /// and anything after a terminal state, are dropped. The feed carries
    /// the value the registry stored, which is capped below completion.
    pub fn publish(&self, percent: u8, message: &str) -> bool {
        match self.registry.update_progress(&self.job_id, percent, message) {
            Ok(Some(committed)) => {
                log::debug!("[{}] {}% {}", self.job_id, committed, message);
                if let Some(ref broadcaster) = self.broadcaster {
                    broadcaster.broadcast(
                        "research:progress",
                        json!({ "jobId": self.job_id, "percent": committed, "status": message }),
                    );
                }
                true
            }
            Ok(None) => {
                log::trace!("[{}] Suppressed progress {}% ({})", self.job_id, percent, message);
                false
            }
            Err(e) => {
                log::warn!("[{}] Progress write failed: {}", self.job_id, e);
                false
            }
        }
    }

    /// Set the highest value heartbeats may reach in the current phase
    pub fn set_ceiling(&self, ceiling: u8) {
        self.ceiling.store(ceiling, Ordering::SeqCst);
    }

    /// Synthetic forward motion: one point up, bounded by the ceiling
    pub fn nudge(&self, message: &str) -> bool {
        let next = self.current().saturating_add(1);
        if next > self.ceiling.load(Ordering::SeqCst) {
            return false;
        }
        self.publish(next, message)
    }

    /// Milestone for a finished subtask; also raises the heartbeat ceiling
    /// to just below the next milestone
    pub fn subtask_finished(&self, done: usize, total: usize, label: &str) -> bool {
        let percent = subtask_milestone(done, total);
        let next = if done >= total {
            SUBTASKS_END
        } else {
            subtask_milestone(done + 1, total) - 1
        };
        self.set_ceiling(next);
        self.publish(
            percent,
            &format!("Finished {} ({}/{} subtasks)", label, done.min(total), total),
        )
    }

    /// Start a heartbeat that nudges progress every `interval` until dropped
    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration, message: &str) -> HeartbeatHandle {
        let publisher = Arc::clone(self);
        let message = message.to_string();
        let interval = interval.max(Duration::from_millis(10));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if publisher.is_terminal() {
                    break;
                }
                publisher.nudge(&message);
            }
        });

        HeartbeatHandle { task }
    }

    /// Write the completed state with its document
    pub fn complete(&self, document: String) -> Result<(), ResearchError> {
        let length = document.len();
        self.registry.complete(&self.job_id, document)?;
        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.broadcast(
                "research:completed",
                json!({ "jobId": self.job_id, "length": length }),
            );
        }
        Ok(())
    }

    /// Write the failed state with a human-readable cause
    pub fn fail(&self, error: &str) -> Result<(), ResearchError> {
        self.registry.fail(&self.job_id, error.to_string())?;
        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.broadcast(
                "research:failed",
                json!({ "jobId": self.job_id, "error": error }),
            );
        }
        Ok(())
    }
}

/// Periodic progress nudger owned by the running job; aborted on drop
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
