// SPDX-License-Identifier: MIT

//! Stale-job recovery loop (`spec.md` §4.F).
//!
//! Runs on every node, but gates each tick behind a single fixed advisory
//! lock id ([`sv_core::STALE_RECOVERY_LOCK_ID`]) so only one node in the
//! fleet performs the sweep at a time. A node that fails to acquire the
//! lock simply skips that tick rather than blocking — the lock is
//! non-blocking (`try_acquire_lock`), and the next node to tick will pick up
//! the sweep.

use std::sync::Arc;
use std::time::Duration;
use sv_core::{Clock, Config};
use sv_storage::Store;
use tokio_util::sync::CancellationToken;

pub struct RecoveryLoop<S, C> {
    store: Arc<S>,
    clock: C,
    config: Arc<Config>,
}

impl<S, C> RecoveryLoop<S, C>
where
    S: Store,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: C, config: Arc<Config>) -> Self {
        Self { store, clock, config }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.stale_recovery_interval) => {}
                _ = shutdown.cancelled() => return,
            }
            self.tick().await;
        }
    }

    /// Run one sweep if the advisory lock is free. Exposed separately from
    /// `run` so the manager can force an initial sweep at startup without
    /// waiting a full interval.
    pub async fn tick(&self) {
        let acquired = match self.store.try_acquire_lock(sv_core::STALE_RECOVERY_LOCK_ID).await {
            Ok(acquired) => acquired,
            Err(err) => {
                tracing::warn!(error = %err, "recovery lock acquisition failed");
                return;
            }
        };
        if !acquired {
            tracing::debug!("recovery lock held by another node, skipping tick");
            return;
        }

        self.sweep().await;

        if let Err(err) = self.store.release_lock(sv_core::STALE_RECOVERY_LOCK_ID).await {
            tracing::warn!(error = %err, "recovery lock release failed");
        }
    }

    async fn sweep(&self) {
        let now_ms = self.clock.epoch_ms();

        match self.store.reset_stale_heartbeat_jobs(self.config.stale_threshold.as_millis() as u64, now_ms).await {
            Ok(reset) if !reset.is_empty() => {
                tracing::warn!(count = reset.len(), "reset jobs with stale heartbeat");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "stale-heartbeat sweep failed"),
        }

        match self.store.reset_timed_out_jobs(now_ms).await {
            Ok(reset) if !reset.is_empty() => {
                tracing::warn!(count = reset.len(), "reset jobs exceeding max duration");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "max-duration sweep failed"),
        }

        match self.store.reset_orphaned_jobs(now_ms).await {
            Ok(reset) if !reset.is_empty() => {
                tracing::warn!(count = reset.len(), "reset jobs orphaned by a dead node");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "orphaned-job sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::{FakeClock, JobStatus, JobType, WorkspaceId};
    use sv_storage::MemoryStore;

    #[tokio::test]
    async fn sweep_resets_stale_heartbeat_job_to_pending() {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        store.create_scan(&scan).await.unwrap();
        let job = sv_core::test_support::pending_job(scan.id, workspace_id, JobType::Crawl);
        store.enqueue_job(&job).await.unwrap();
        store
            .claim_next_job(sv_core::WorkerId::new(), sv_core::NodeId::new(), &[], None, 0)
            .await
            .unwrap();

        let config = Arc::new(Config { stale_threshold: Duration::from_secs(60), ..Config::default() });
        let recovery = RecoveryLoop::new(store.clone(), FakeClock::new(), config);
        recovery.sweep().await;

        let reloaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn tick_is_a_noop_when_lock_already_held() {
        let store = Arc::new(MemoryStore::new());
        store.try_acquire_lock(sv_core::STALE_RECOVERY_LOCK_ID).await.unwrap();

        let recovery = RecoveryLoop::new(store.clone(), FakeClock::new(), Arc::new(Config::default()));
        recovery.tick().await;

        // Lock is still held by "another node" — tick should not have released it.
        assert!(!store.try_acquire_lock(sv_core::STALE_RECOVERY_LOCK_ID).await.unwrap());
    }
}
