// Graceful shutdown handling for signal trapping

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::jobs::JobRegistry;
use crate::models::ResearchError;

/// Shared shutdown state across the application
#[derive(Clone)]
pub struct ShutdownState {
    /// Flag indicating shutdown has been requested
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            log::info!("Shutdown requested");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested
    pub async fn wait_for_shutdown(&self) {
        while !self.is_shutdown_requested() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of graceful shutdown cleanup
#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    /// Jobs that were still pending or processing and were marked failed
    pub jobs_interrupted: Vec<String>,
    /// Any errors encountered during cleanup
    pub errors: Vec<String>,
}

/// Graceful shutdown handler
pub struct ShutdownHandler {
    state: ShutdownState,
}

impl ShutdownHandler {
    pub fn with_state(state: ShutdownState) -> Self {
        Self { state }
    }

    /// Fail every job that has not reached a terminal state so observers
    /// get an answer instead of waiting on a worker that is going away
    pub fn handle_shutdown(&self, registry: &JobRegistry) -> ShutdownResult {
        self.state.request_shutdown();
        log::info!("Starting graceful shutdown...");

        let mut result = ShutdownResult::default();
        for job_id in registry.in_flight_ids() {
            match registry.fail(&job_id, "Server shut down before the job finished".to_string()) {
                Ok(()) => result.jobs_interrupted.push(job_id),
                // Finished between listing and failing
                Err(ResearchError::InvalidState(e)) => {
                    log::debug!("Skipping job {}: {}", job_id, e)
                }
                Err(e) => result.errors.push(format!("{}: {}", job_id, e)),
            }
        }

        log::info!(
            "Shutdown complete: {} in-flight job(s) interrupted",
            result.jobs_interrupted.len()
        );
        for error in &result.errors {
            log::warn!("Cleanup error: {}", error);
        }

        result
    }
}

/// Register signal handlers for graceful shutdown
/// This sets up handlers for SIGINT (Ctrl+C), SIGTERM, and SIGHUP
#[cfg(unix)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .map_err(|e| anyhow::anyhow!("Failed to register signal handlers: {}", e))?;

    thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGINT => log::info!("Received SIGINT (Ctrl+C)"),
                SIGTERM => log::info!("Received SIGTERM"),
                SIGHUP => log::info!("Received SIGHUP"),
                _ => continue,
            }
            state.request_shutdown();
        }
    });

    log::info!("Signal handlers registered (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}

/// Register signal handlers for Windows
#[cfg(windows)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C");
        state.request_shutdown();
    })
    .map_err(|e| anyhow::anyhow!("Failed to register Ctrl+C handler: {}", e))?;

    log::info!("Signal handler registered (Ctrl+C)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateJobRequest, JobStatus};

    #[test]
    fn test_shutdown_state_clone_shares_flags() {
        let state1 = ShutdownState::new();
        let state2 = state1.clone();
        assert!(!state2.is_shutdown_requested());

        state1.request_shutdown();
        assert!(state2.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves() {
        let state = ShutdownState::new();
        let waiter = state.clone();
        let task = tokio::spawn(async move { waiter.wait_for_shutdown().await });

        state.request_shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_handle_shutdown_fails_in_flight_jobs_only() {
        let registry = JobRegistry::new();
        let running = registry.create_job(&CreateJobRequest::new("a")).unwrap();
        registry.start_processing(&running.id, "Working").unwrap();
        let pending = registry.create_job(&CreateJobRequest::new("b")).unwrap();
        let done = registry.create_job(&CreateJobRequest::new("c")).unwrap();
        registry.start_processing(&done.id, "Working").unwrap();
        registry.complete(&done.id, "doc".to_string()).unwrap();

        let state = ShutdownState::new();
        let handler = ShutdownHandler::with_state(state.clone());
        let mut result = handler.handle_shutdown(&registry);
        result.jobs_interrupted.sort();

        let mut expected = vec![running.id.clone(), pending.id.clone()];
        expected.sort();
        assert_eq!(result.jobs_interrupted, expected);
        assert!(result.errors.is_empty());
        assert!(state.is_shutdown_requested());

        assert_eq!(registry.get(&running.id).unwrap().status, JobStatus::Failed);
        assert_eq!(registry.get(&done.id).unwrap().status, JobStatus::Completed);
    }
}
