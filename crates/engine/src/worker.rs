// SPDX-License-Identifier: MIT

//! A single worker: claim, check control, execute, complete/fail, repeat
//! (`spec.md` §4.D).
//!
//! Three independent cancellation paths converge on one in-flight job:
//! process shutdown (`shutdown` token), scan-level cancellation (the claimed
//! job's own [`ScanControl`] token), and per-job database cancellation
//! (polled on `job_cancel_poll_interval` — a user can cancel a single job
//! without cancelling its scan). All three race against the job's
//! `max_duration` deadline inside one `tokio::select!`.

use crate::executor::ExecutorRegistry;
use std::sync::Arc;
use std::time::Duration;
use sv_core::{Clock, Config, ControlRegistry, JobId, JobType, NodeId, WorkerId};
use sv_storage::Store;
use tokio_util::sync::CancellationToken;

/// One worker's identity and dependencies. Long-lived — a `Worker` runs one
/// `run` loop for the lifetime of the pool, claiming and executing jobs one
/// at a time (not one task per job; see `spec.md`'s Worker Pool notes).
pub struct Worker<S, C> {
    pub id: WorkerId,
    pub node_id: NodeId,
    store: Arc<S>,
    executors: ExecutorRegistry,
    control: ControlRegistry,
    clock: C,
    config: Arc<Config>,
    /// Job types this worker claims. Empty means "any".
    job_types: Vec<JobType>,
    /// Set for isolated-mode pools: only claim jobs for this scan.
    bound_scan_id: Option<sv_core::ScanId>,
}

impl<S, C> Worker<S, C>
where
    S: Store + 'static,
    C: Clock,
{
    pub fn new(
        id: WorkerId,
        node_id: NodeId,
        store: Arc<S>,
        executors: ExecutorRegistry,
        control: ControlRegistry,
        clock: C,
        config: Arc<Config>,
        job_types: Vec<JobType>,
        bound_scan_id: Option<sv_core::ScanId>,
    ) -> Self {
        Self {
            id,
            node_id,
            store,
            executors,
            control,
            clock,
            config,
            job_types,
            bound_scan_id,
        }
    }

    /// Run until `shutdown` is cancelled. Never returns an error: execution
    /// failures are recorded against the job and the loop continues.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let claimed = self
                .store
                .claim_next_job(
                    self.id,
                    self.node_id,
                    &self.job_types,
                    self.bound_scan_id,
                    self.clock.epoch_ms(),
                )
                .await;

            let job = match claimed {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => continue,
                        _ = shutdown.cancelled() => return,
                    }
                }
                Err(err) => {
                    tracing::warn!(worker = %self.id, error = %err, "claim failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => continue,
                        _ = shutdown.cancelled() => return,
                    }
                }
            };

            let control = self.control.get_or_insert(job.scan_id);
            if control.is_cancelled() {
                tracing::info!(worker = %self.id, job = %job.id, "scan cancelled before dispatch");
                let _ = self.store.cancel_job(job.id, self.clock.epoch_ms()).await;
                continue;
            }
            if control.is_paused() {
                tracing::debug!(worker = %self.id, job = %job.id, "scan paused, releasing claim");
                let _ = self.store.release_job(job.id, self.clock.epoch_ms()).await;
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => continue,
                    _ = shutdown.cancelled() => return,
                }
            }

            if let Err(err) = self.store.mark_job_running(job.id, self.clock.epoch_ms()).await {
                tracing::warn!(worker = %self.id, job = %job.id, error = %err, "mark_job_running failed");
            }

            self.execute_one(&job, &control, &shutdown).await;
        }
    }

    async fn execute_one(
        &self,
        job: &sv_core::ScanJob,
        control: &sv_core::ScanControl,
        shutdown: &CancellationToken,
    ) {
        let job_id: JobId = job.id;
        tracing::info!(worker = %self.id, job = %job_id, job_type = %job.job_type, "executing job");

        let deadline = Duration::from_millis(job.max_duration_ms);
        let cancel_poll = self.config.job_cancel_poll_interval;
        let scan_cancel = control.cancellation_token();

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Outcome::Cancelled("process shutdown"),
            _ = scan_cancel.cancelled() => Outcome::Cancelled("scan cancelled"),
            _ = tokio::time::sleep(deadline) => Outcome::TimedOut,
            _ = self.watch_job_cancellation(job_id, cancel_poll) => Outcome::Cancelled("job cancelled"),
            result = self.executors.execute(job, control) => Outcome::Finished(result),
        };

        let now_ms = self.clock.epoch_ms();
        match outcome {
            Outcome::Finished(Ok(_)) => {
                if let Err(err) = self.store.complete_job(job_id, now_ms).await {
                    tracing::warn!(job = %job_id, error = %err, "complete_job failed");
                }
                tracing::info!(worker = %self.id, job = %job_id, "job completed");
            }
            Outcome::Finished(Err(err)) => {
                tracing::warn!(worker = %self.id, job = %job_id, error = %err, "job execution failed");
                if let Err(store_err) = self.store.fail_job(job_id, &err.to_string(), now_ms).await {
                    tracing::warn!(job = %job_id, error = %store_err, "fail_job failed");
                }
            }
            Outcome::TimedOut => {
                tracing::warn!(worker = %self.id, job = %job_id, "job exceeded max duration");
                let msg = sv_core::ExecuteError::ContextCancelled.to_string();
                if let Err(store_err) = self.store.fail_job(job_id, &msg, now_ms).await {
                    tracing::warn!(job = %job_id, error = %store_err, "fail_job failed");
                }
            }
            Outcome::Cancelled(reason) => {
                tracing::info!(worker = %self.id, job = %job_id, reason, "job cancelled mid-execution");
                if let Err(store_err) = self.store.cancel_job(job_id, now_ms).await {
                    tracing::warn!(job = %job_id, error = %store_err, "cancel_job failed");
                }
            }
        }
    }

    /// Poll the database every `interval` until the job is observed
    /// cancelled. Never returns otherwise — the caller races this against
    /// completion/timeout/shutdown in `execute_one`'s `select!`.
    async fn watch_job_cancellation(&self, job_id: JobId, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            match self.store.get_job(job_id).await {
                Ok(Some(job)) if job.status == sv_core::JobStatus::Cancelled => return,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(job = %job_id, error = %err, "cancellation poll failed");
                    continue;
                }
            }
        }
    }
}

enum Outcome {
    Finished(sv_core::ExecuteResult<serde_json::Value>),
    TimedOut,
    Cancelled(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sv_core::{FakeClock, ScanStatus};
    use sv_storage::MemoryStore;

    struct CountingExecutor {
        job_type: JobType,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Executor for CountingExecutor {
        fn job_type(&self) -> JobType {
            self.job_type
        }

        async fn execute(&self, _job: &sv_core::ScanJob, _control: &sv_core::ScanControl) -> sv_core::ExecuteResult<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::Value::Null)
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<AtomicUsize>, sv_core::ScanId) {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = sv_core::WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();
        store.update_scan_status(scan_id, ScanStatus::Crawling, 0).await.unwrap();
        let job = sv_core::test_support::pending_job(scan_id, workspace_id, JobType::Crawl);
        store.enqueue_job(&job).await.unwrap();
        (store, Arc::new(AtomicUsize::new(0)), scan_id)
    }

    #[tokio::test(start_paused = true)]
    async fn worker_executes_claimed_job_and_marks_complete() {
        let (store, calls, scan_id) = setup().await;
        let executors = ExecutorRegistry::new();
        executors.register(Arc::new(CountingExecutor { job_type: JobType::Crawl, calls: calls.clone() }));

        let worker = Worker::new(
            WorkerId::new(),
            NodeId::new(),
            store.clone(),
            executors,
            ControlRegistry::new(),
            FakeClock::new(),
            Arc::new(Config::default()),
            vec![],
            None,
        );

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(async move { worker.run(shutdown_clone).await });

        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        shutdown.cancel();
        let _ = handle.await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let jobs = store.list_jobs_for_scan(scan_id).await.unwrap();
        assert_eq!(jobs[0].status, sv_core::JobStatus::Completed);
    }
}
