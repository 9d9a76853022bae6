// Research job state machine with validation

use super::JobStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateTransitionError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job already in terminal state: {0}")]
    AlreadyTerminal(JobStatus),
}

/// Validates if a job can transition from one status to another.
/// Transitions only move forward; terminal states are final.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    match (from, to) {
        (JobStatus::Pending, JobStatus::Processing) => true,
        // Can fail before work starts (e.g. configuration lost)
        (JobStatus::Pending, JobStatus::Failed) => true,

        (JobStatus::Processing, JobStatus::Processing) => true,
        (JobStatus::Processing, JobStatus::Completed) => true,
        (JobStatus::Processing, JobStatus::Failed) => true,

        _ => false,
    }
}

/// Validates and performs a state transition
pub fn transition_state(
    current: JobStatus,
    target: JobStatus,
) -> Result<JobStatus, StateTransitionError> {
    if current.is_terminal() {
        return Err(StateTransitionError::AlreadyTerminal(current));
    }

    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_processing() {
        assert_eq!(
            transition_state(JobStatus::Pending, JobStatus::Processing),
            Ok(JobStatus::Processing)
        );
    }

    #[test]
    fn test_processing_to_terminal() {
        assert!(can_transition(JobStatus::Processing, JobStatus::Completed));
        assert!(can_transition(JobStatus::Processing, JobStatus::Failed));
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert_eq!(
            transition_state(JobStatus::Pending, JobStatus::Completed),
            Err(StateTransitionError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
            })
        );
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!can_transition(JobStatus::Processing, JobStatus::Pending));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            assert!(!can_transition(terminal, JobStatus::Failed));
            assert_eq!(
                transition_state(terminal, JobStatus::Processing),
                Err(StateTransitionError::AlreadyTerminal(terminal))
            );
            assert_eq!(
                transition_state(terminal, terminal),
                Err(StateTransitionError::AlreadyTerminal(terminal))
            );
        }
    }

    #[test]
    fn test_pending_can_fail_before_work_starts() {
        assert_eq!(
            transition_state(JobStatus::Pending, JobStatus::Failed),
            Ok(JobStatus::Failed)
        );
    }
}
