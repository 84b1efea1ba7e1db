// SPDX-License-Identifier: MIT

//! In-process [`Store`] implementation backed by `HashMap`s behind a mutex.
//!
//! Used by engine and manager test suites so they don't need a live Postgres
//! instance; also useful for local single-node development.

use crate::error::{StorageError, StorageResult};
use crate::store::Store;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use sv_core::{
    JobId, JobStatus, JobType, NodeId, Scan, ScanCheckpoint, ScanId, ScanJob, ScanPhase,
    ScanStatus, WorkerId, WorkerNode, WorkspaceId,
};

#[derive(Default)]
struct Inner {
    scans: HashMap<ScanId, Scan>,
    jobs: HashMap<JobId, ScanJob>,
    nodes: HashMap<NodeId, WorkerNode>,
    locks: HashSet<i64>,
}

/// In-memory store. Cheap to clone (an `Arc` internally); all state is
/// shared across clones.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_scan(&self, scan: &Scan) -> StorageResult<()> {
        self.inner.lock().scans.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get_scan(&self, scan_id: ScanId) -> StorageResult<Option<Scan>> {
        Ok(self.inner.lock().scans.get(&scan_id).cloned())
    }

    async fn update_scan_status(&self, scan_id: ScanId, status: ScanStatus, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let scan = guard
            .scans
            .get_mut(&scan_id)
            .ok_or_else(|| StorageError::ScanNotFound(scan_id.to_string()))?;
        scan.status = status;
        scan.updated_at_ms = now_ms;
        if status == ScanStatus::Crawling && scan.started_at_ms.is_none() {
            scan.started_at_ms = Some(now_ms);
        }
        Ok(())
    }

    async fn update_scan_phase(&self, scan_id: ScanId, phase: ScanPhase, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let scan = guard
            .scans
            .get_mut(&scan_id)
            .ok_or_else(|| StorageError::ScanNotFound(scan_id.to_string()))?;
        scan.phase = phase;
        scan.updated_at_ms = now_ms;
        Ok(())
    }

    async fn update_scan_checkpoint(
        &self,
        scan_id: ScanId,
        checkpoint: &ScanCheckpoint,
        now_ms: u64,
    ) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let scan = guard
            .scans
            .get_mut(&scan_id)
            .ok_or_else(|| StorageError::ScanNotFound(scan_id.to_string()))?;
        scan.checkpoint = checkpoint.clone();
        scan.updated_at_ms = now_ms;
        Ok(())
    }

    async fn list_active_scans(&self, workspace_id: Option<WorkspaceId>) -> StorageResult<Vec<Scan>> {
        let guard = self.inner.lock();
        Ok(guard
            .scans
            .values()
            .filter(|s| !s.status.is_terminal())
            .filter(|s| workspace_id.map_or(true, |w| w == s.workspace_id))
            .cloned()
            .collect())
    }

    async fn refresh_scan_counters(&self, scan_id: ScanId) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let counters = {
            let jobs: Vec<&ScanJob> = guard.jobs.values().filter(|j| j.scan_id == scan_id).collect();
            let mut counters = sv_core::ScanCounters::default();
            for job in jobs {
                match job.status {
                    JobStatus::Pending | JobStatus::Claimed => counters.pending += 1,
                    JobStatus::Running => counters.running += 1,
                    JobStatus::Completed => counters.completed += 1,
                    JobStatus::Failed | JobStatus::Cancelled => counters.failed += 1,
                }
            }
            counters
        };
        if let Some(scan) = guard.scans.get_mut(&scan_id) {
            scan.counters = counters;
        }
        Ok(())
    }

    async fn enqueue_job(&self, job: &ScanJob) -> StorageResult<()> {
        self.enqueue_jobs(std::slice::from_ref(job)).await
    }

    async fn enqueue_jobs(&self, jobs: &[ScanJob]) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        for job in jobs {
            if job.job_type == JobType::Discovery
                && guard.jobs.values().any(|existing| {
                    existing.job_type == JobType::Discovery
                        && existing.scan_id == job.scan_id
                        && existing.target.url == job.target.url
                })
            {
                continue;
            }
            guard.jobs.insert(job.id, job.clone());
        }
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> StorageResult<Option<ScanJob>> {
        Ok(self.inner.lock().jobs.get(&job_id).cloned())
    }

    async fn list_jobs_for_scan(&self, scan_id: ScanId) -> StorageResult<Vec<ScanJob>> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.scan_id == scan_id)
            .cloned()
            .collect())
    }

    async fn claim_next_job(
        &self,
        worker_id: WorkerId,
        node_id: NodeId,
        job_types: &[JobType],
        bound_scan_id: Option<ScanId>,
        now_ms: u64,
    ) -> StorageResult<Option<ScanJob>> {
        let mut guard = self.inner.lock();
        let scans = guard.scans.clone();
        let mut candidates: Vec<JobId> = guard
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| job_types.is_empty() || job_types.contains(&j.job_type))
            .filter(|j| bound_scan_id.map_or(true, |sid| sid == j.scan_id))
            .filter(|j| scans.get(&j.scan_id).map_or(false, |s| s.status.is_runnable()))
            .map(|j| j.id)
            .collect();

        candidates.sort_by(|a, b| {
            let ja = &guard.jobs[a];
            let jb = &guard.jobs[b];
            jb.priority
                .cmp(&ja.priority)
                .then(ja.created_at_ms.cmp(&jb.created_at_ms))
        });

        let Some(job_id) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let Some(job) = guard.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        job.status = JobStatus::Claimed;
        job.claim.worker_id = Some(worker_id);
        job.claim.node_id = Some(node_id);
        job.claim.claimed_at_ms = Some(now_ms);
        job.claim.last_heartbeat_ms = Some(now_ms);
        job.updated_at_ms = now_ms;
        Ok(Some(job.clone()))
    }

    async fn mark_job_running(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        job.status = JobStatus::Running;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn release_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        job.status = JobStatus::Pending;
        job.claim = sv_core::JobClaim::default();
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn heartbeat_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        job.claim.last_heartbeat_ms = Some(now_ms);
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn complete_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        job.status = JobStatus::Completed;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn fail_job(&self, job_id: JobId, error: &str, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        job.last_error = Some(error.to_string());
        job.status = JobStatus::Failed;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn cancel_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        let mut guard = self.inner.lock();
        let job = guard
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;
        job.status = JobStatus::Cancelled;
        job.updated_at_ms = now_ms;
        Ok(())
    }

    async fn cancel_jobs_for_scan(&self, scan_id: ScanId, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let mut guard = self.inner.lock();
        let mut cancelled = Vec::new();
        for job in guard.jobs.values_mut() {
            if job.scan_id == scan_id && job.status.is_outstanding() {
                job.status = JobStatus::Cancelled;
                job.updated_at_ms = now_ms;
                cancelled.push(job.id);
            }
        }
        Ok(cancelled)
    }

    async fn phase_has_outstanding_jobs(&self, scan_id: ScanId, job_type: JobType) -> StorageResult<bool> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .any(|j| j.scan_id == scan_id && j.job_type == job_type && j.status.is_outstanding()))
    }

    async fn reset_stale_heartbeat_jobs(&self, threshold_ms: u64, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let mut guard = self.inner.lock();
        let mut reset = Vec::new();
        for job in guard.jobs.values_mut() {
            if !matches!(job.status, JobStatus::Claimed | JobStatus::Running) {
                continue;
            }
            let last = job.claim.last_heartbeat_ms.unwrap_or(job.updated_at_ms);
            if now_ms.saturating_sub(last) > threshold_ms {
                job.status = JobStatus::Pending;
                job.claim = sv_core::JobClaim::default();
                job.updated_at_ms = now_ms;
                reset.push(job.id);
            }
        }
        Ok(reset)
    }

    async fn reset_timed_out_jobs(&self, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let mut guard = self.inner.lock();
        let mut reset = Vec::new();
        for job in guard.jobs.values_mut() {
            if !matches!(job.status, JobStatus::Claimed | JobStatus::Running) {
                continue;
            }
            let Some(claimed_at) = job.claim.claimed_at_ms else { continue };
            if now_ms.saturating_sub(claimed_at) > job.max_duration_ms {
                job.retry_count += 1;
                job.updated_at_ms = now_ms;
                if job.retries_exhausted() {
                    job.status = JobStatus::Failed;
                } else {
                    job.status = JobStatus::Pending;
                    job.claim = sv_core::JobClaim::default();
                }
                reset.push(job.id);
            }
        }
        Ok(reset)
    }

    async fn reset_orphaned_jobs(&self, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let mut guard = self.inner.lock();
        let live_nodes: HashSet<NodeId> = guard.nodes.keys().copied().collect();
        let mut reset = Vec::new();
        for job in guard.jobs.values_mut() {
            if !matches!(job.status, JobStatus::Claimed | JobStatus::Running) {
                continue;
            }
            let Some(node_id) = job.claim.node_id else { continue };
            if !live_nodes.contains(&node_id) {
                job.status = JobStatus::Pending;
                job.claim = sv_core::JobClaim::default();
                job.updated_at_ms = now_ms;
                reset.push(job.id);
            }
        }
        Ok(reset)
    }

    async fn upsert_worker_node(&self, node: &WorkerNode) -> StorageResult<()> {
        self.inner.lock().nodes.insert(node.node_id, node.clone());
        Ok(())
    }

    async fn heartbeat_worker_node(&self, node_id: NodeId, now_ms: u64) -> StorageResult<()> {
        if let Some(node) = self.inner.lock().nodes.get_mut(&node_id) {
            node.last_heartbeat_ms = now_ms;
        }
        Ok(())
    }

    async fn list_worker_nodes(&self) -> StorageResult<Vec<WorkerNode>> {
        Ok(self.inner.lock().nodes.values().cloned().collect())
    }

    async fn remove_worker_node(&self, node_id: NodeId) -> StorageResult<()> {
        self.inner.lock().nodes.remove(&node_id);
        Ok(())
    }

    async fn try_acquire_lock(&self, key: i64) -> StorageResult<bool> {
        Ok(self.inner.lock().locks.insert(key))
    }

    async fn release_lock(&self, key: i64) -> StorageResult<()> {
        self.inner.lock().locks.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::test_support::pending_job;

    #[tokio::test]
    async fn claim_picks_highest_priority_pending_job() {
        let store = MemoryStore::new();
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();
        store
            .update_scan_status(scan_id, ScanStatus::Crawling, 1_000)
            .await
            .unwrap();

        let mut low = pending_job(scan_id, workspace_id, JobType::Nuclei);
        low.priority = 5;
        let mut high = pending_job(scan_id, workspace_id, JobType::Crawl);
        high.priority = 20;
        store.enqueue_job(&low).await.unwrap();
        store.enqueue_job(&high).await.unwrap();

        let claimed = store
            .claim_next_job(WorkerId::new(), NodeId::new(), &[], None, 2_000)
            .await
            .unwrap()
            .expect("a job should be claimed");
        assert_eq!(claimed.id, high.id);
        assert_eq!(claimed.status, JobStatus::Claimed);
    }

    #[tokio::test]
    async fn claim_skips_jobs_for_non_runnable_scans() {
        let store = MemoryStore::new();
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();
        store
            .update_scan_status(scan_id, ScanStatus::Paused, 1_000)
            .await
            .unwrap();
        let job = pending_job(scan_id, workspace_id, JobType::Crawl);
        store.enqueue_job(&job).await.unwrap();

        let claimed = store
            .claim_next_job(WorkerId::new(), NodeId::new(), &[], None, 2_000)
            .await
            .unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn fail_job_is_terminal_and_does_not_retry() {
        let store = MemoryStore::new();
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        store.create_scan(&scan).await.unwrap();
        let mut job = pending_job(scan.id, workspace_id, JobType::Crawl);
        job.max_retries = 3;
        store.enqueue_job(&job).await.unwrap();

        store.fail_job(job.id, "boom", 1_000).await.unwrap();
        let reloaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
        assert_eq!(reloaded.retry_count, 0);
        assert_eq!(reloaded.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn reset_timed_out_jobs_retries_then_exhausts() {
        let store = MemoryStore::new();
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        store.create_scan(&scan).await.unwrap();
        let mut job = pending_job(scan.id, workspace_id, JobType::Crawl);
        job.max_retries = 1;
        job.max_duration_ms = 1_000;
        store.enqueue_job(&job).await.unwrap();
        store
            .claim_next_job(WorkerId::new(), NodeId::new(), &[], None, 0)
            .await
            .unwrap();

        let reset = store.reset_timed_out_jobs(2_000).await.unwrap();
        assert_eq!(reset, vec![job.id]);
        let reloaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Pending);
        assert_eq!(reloaded.retry_count, 1);

        store
            .claim_next_job(WorkerId::new(), NodeId::new(), &[], None, 2_000)
            .await
            .unwrap();
        let reset = store.reset_timed_out_jobs(5_000).await.unwrap();
        assert_eq!(reset, vec![job.id]);
        let reloaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn advisory_lock_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.try_acquire_lock(42).await.unwrap());
        assert!(!store.try_acquire_lock(42).await.unwrap());
        store.release_lock(42).await.unwrap();
        assert!(store.try_acquire_lock(42).await.unwrap());
    }
}
