// SPDX-License-Identifier: MIT

//! The Executor Registry — a uniform `execute` contract across job types,
//! mapping a [`JobType`] to whichever concrete executor handles it
//! (`spec.md` §4.C).

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use sv_core::{ExecuteError, ExecuteResult, JobType, ScanControl, ScanJob};

/// Per-job-type work. Implementors receive the claimed job, a
/// cancellation-aware context, and the owning scan's control handle so they
/// can check `is_paused`/`is_cancelled` mid-execution for long-running work.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The job type this executor handles.
    fn job_type(&self) -> JobType;

    /// Run the job to completion. Implementors should select against
    /// `control.cancellation_token()` for any internal awaits longer than a
    /// few hundred milliseconds so cancellation is prompt.
    async fn execute(&self, job: &ScanJob, control: &ScanControl) -> ExecuteResult<serde_json::Value>;
}

/// Maps [`JobType`] to the [`Executor`] that handles it. Built once at
/// startup and shared (read-mostly) across every worker in the pool.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<RwLock<HashMap<JobType, Arc<dyn Executor>>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, executor: Arc<dyn Executor>) {
        self.executors.write().insert(executor.job_type(), executor);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn Executor>> {
        self.executors.read().get(&job_type).cloned()
    }

    /// Run the registered executor for `job.job_type`, or
    /// [`ExecuteError::NoExecutor`] if none is registered.
    pub async fn execute(&self, job: &ScanJob, control: &ScanControl) -> ExecuteResult<serde_json::Value> {
        let executor = self
            .get(job.job_type)
            .ok_or(ExecuteError::NoExecutor(job.job_type))?;
        executor.execute(job, control).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::{ControlRegistry, JobType};

    struct EchoExecutor(JobType);

    #[async_trait]
    impl Executor for EchoExecutor {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn execute(&self, job: &ScanJob, _control: &ScanControl) -> ExecuteResult<serde_json::Value> {
            Ok(serde_json::json!({ "job_id": job.id.to_string() }))
        }
    }

    #[tokio::test]
    async fn executes_registered_job_type() {
        let registry = ExecutorRegistry::new();
        registry.register(Arc::new(EchoExecutor(JobType::Crawl)));

        let control_registry = ControlRegistry::new();
        let job = sv_core::test_support::pending_job(
            sv_core::ScanId::new(),
            sv_core::WorkspaceId::new(),
            JobType::Crawl,
        );
        let control = control_registry.get_or_insert(job.scan_id);
        let result = registry.execute(&job, &control).await.unwrap();
        assert_eq!(result["job_id"], job.id.to_string());
    }

    #[tokio::test]
    async fn missing_executor_returns_no_executor_error() {
        let registry = ExecutorRegistry::new();
        let control_registry = ControlRegistry::new();
        let job = sv_core::test_support::pending_job(
            sv_core::ScanId::new(),
            sv_core::WorkspaceId::new(),
            JobType::Nuclei,
        );
        let control = control_registry.get_or_insert(job.scan_id);
        let err = registry.execute(&job, &control).await.unwrap_err();
        assert!(matches!(err, ExecuteError::NoExecutor(JobType::Nuclei)));
    }
}
