// SPDX-License-Identifier: MIT

//! The `Store` trait — durable persistence for scans, jobs, and worker
//! fleet membership. The VM and engine operate exclusively through this
//! trait, enabling pluggable backends (in-memory for tests, Postgres for
//! production).

use crate::error::StorageResult;
use async_trait::async_trait;
use sv_core::{
    JobId, JobType, NodeId, Scan, ScanCheckpoint, ScanId, ScanJob, ScanPhase, ScanStatus,
    WorkerId, WorkerNode, WorkspaceId,
};

/// Durable persistence for the scan orchestration and job execution
/// subsystem.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Scans ──

    async fn create_scan(&self, scan: &Scan) -> StorageResult<()>;
    async fn get_scan(&self, scan_id: ScanId) -> StorageResult<Option<Scan>>;
    async fn update_scan_status(&self, scan_id: ScanId, status: ScanStatus, now_ms: u64) -> StorageResult<()>;
    async fn update_scan_phase(&self, scan_id: ScanId, phase: ScanPhase, now_ms: u64) -> StorageResult<()>;
    async fn update_scan_checkpoint(
        &self,
        scan_id: ScanId,
        checkpoint: &ScanCheckpoint,
        now_ms: u64,
    ) -> StorageResult<()>;
    /// Scans not yet in a terminal status, used to reconcile the Control Registry.
    async fn list_active_scans(&self, workspace_id: Option<WorkspaceId>) -> StorageResult<Vec<Scan>>;
    async fn refresh_scan_counters(&self, scan_id: ScanId) -> StorageResult<()>;

    // ── Job queue ──

    async fn enqueue_job(&self, job: &ScanJob) -> StorageResult<()>;
    async fn enqueue_jobs(&self, jobs: &[ScanJob]) -> StorageResult<()>;
    async fn get_job(&self, job_id: JobId) -> StorageResult<Option<ScanJob>>;
    async fn list_jobs_for_scan(&self, scan_id: ScanId) -> StorageResult<Vec<ScanJob>>;

    /// Atomically claim and return the single highest-priority pending job
    /// of the given types for a runnable scan, marking it `Claimed` and
    /// stamping claim metadata. Returns `None` when no eligible job exists.
    async fn claim_next_job(
        &self,
        worker_id: WorkerId,
        node_id: NodeId,
        job_types: &[JobType],
        bound_scan_id: Option<ScanId>,
        now_ms: u64,
    ) -> StorageResult<Option<ScanJob>>;

    async fn mark_job_running(&self, job_id: JobId, now_ms: u64) -> StorageResult<()>;

    /// Release a claim without penalty (no retry increment, no error
    /// recorded) — used when a worker claims a job for a scan it then
    /// discovers is paused.
    async fn release_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()>;
    async fn heartbeat_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()>;
    async fn complete_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()>;

    /// Record a failure. If the job's retry budget isn't exhausted it is
    /// reset to `Pending` (with `retry_count` incremented); otherwise it
    /// moves to `Failed`.
    async fn fail_job(&self, job_id: JobId, error: &str, now_ms: u64) -> StorageResult<()>;
    async fn cancel_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()>;
    async fn cancel_jobs_for_scan(&self, scan_id: ScanId, now_ms: u64) -> StorageResult<Vec<JobId>>;

    /// True if any job of `job_type` for `scan_id` is pending, claimed, or
    /// running — used by the phase orchestrator to decide phase completion.
    async fn phase_has_outstanding_jobs(&self, scan_id: ScanId, job_type: JobType) -> StorageResult<bool>;

    /// Reset jobs claimed/running with no heartbeat within `threshold_ms` of
    /// `now_ms` back to `Pending`. Returns the reset job ids.
    async fn reset_stale_heartbeat_jobs(&self, threshold_ms: u64, now_ms: u64) -> StorageResult<Vec<JobId>>;

    /// Reset jobs whose `claimed_at + max_duration_ms` has elapsed. Returns
    /// the reset job ids.
    async fn reset_timed_out_jobs(&self, now_ms: u64) -> StorageResult<Vec<JobId>>;

    /// Fallback sweep: any claimed/running job whose owning node no longer
    /// appears in the worker node table at all.
    async fn reset_orphaned_jobs(&self, now_ms: u64) -> StorageResult<Vec<JobId>>;

    // ── Worker fleet ──

    async fn upsert_worker_node(&self, node: &WorkerNode) -> StorageResult<()>;
    async fn heartbeat_worker_node(&self, node_id: NodeId, now_ms: u64) -> StorageResult<()>;
    async fn list_worker_nodes(&self) -> StorageResult<Vec<WorkerNode>>;
    async fn remove_worker_node(&self, node_id: NodeId) -> StorageResult<()>;

    // ── Advisory locking (Postgres session-scoped; no-op/mutex for in-memory) ──

    /// Non-blocking attempt to acquire a fleet-wide advisory lock. Returns
    /// `false` immediately if another session holds it.
    async fn try_acquire_lock(&self, key: i64) -> StorageResult<bool>;
    async fn release_lock(&self, key: i64) -> StorageResult<()>;
}
