// SPDX-License-Identifier: MIT

//! Shared error taxonomy for job execution (`spec.md` §4.C, §4.D).

use crate::job::JobType;
use thiserror::Error;

/// Errors a worker can observe while executing a single job.
///
/// `ClaimConflict` is the one variant that should never reach a caller: a
/// claim race is resolved entirely inside the storage layer's `FOR UPDATE
/// SKIP LOCKED` query, so by the time a worker holds a `ScanJob` it has
/// already won the claim. It's kept in the enum because the storage layer's
/// claim query returns it as a signal (not an error) for "nothing to claim",
/// and worker code matches on it explicitly rather than treating it as a
/// execution failure.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("no executor registered for job type {0}")]
    NoExecutor(JobType),
    #[error("execution failed: {0}")]
    ExecutionError(String),
    #[error("job context cancelled before completion")]
    ContextCancelled,
    #[error("job exceeded its {0:?} max duration")]
    Timeout(std::time::Duration),
    #[error("claim conflict (job already claimed by another worker)")]
    ClaimConflict,
    #[error("job type {found} scheduled under phase expecting {expected}")]
    ScheduleMismatch {
        expected: crate::scan::ScanPhase,
        found: crate::scan::ScanPhase,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl ExecuteError {
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }
}

pub type ExecuteResult<T> = Result<T, ExecuteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_executor_message_names_job_type() {
        let err = ExecuteError::NoExecutor(JobType::Nuclei);
        assert!(err.to_string().contains("nuclei"));
    }

    #[test]
    fn schedule_mismatch_names_both_phases() {
        use crate::scan::ScanPhase;
        let err = ExecuteError::ScheduleMismatch {
            expected: ScanPhase::Crawl,
            found: ScanPhase::Nuclei,
        };
        let msg = err.to_string();
        assert!(msg.contains("crawl"));
        assert!(msg.contains("nuclei"));
    }
}
