// SPDX-License-Identifier: MIT

//! The Phase Orchestrator: advances a scan through its fixed phase graph as
//! each phase's jobs drain from the queue (`spec.md` §4.G).
//!
//! Phase completion is derived from queue state, never tracked separately —
//! a phase is done when [`Store::phase_has_outstanding_jobs`] reports no
//! pending/claimed/running job of that phase's job type remains. This makes
//! resumption after a restart idempotent: on restart the orchestrator simply
//! re-evaluates the current phase against current queue state instead of
//! replaying in-memory progress.

use std::sync::Arc;
use sv_core::{Clock, ExecuteResult, Scan, ScanId, ScanPhase, ScanStatus};
use sv_storage::Store;

/// Per-phase scheduling callback: given the scan and its checkpoint, enqueue
/// that phase's jobs. Implemented by the scan manager, which knows how to
/// build each phase's payloads from the prior phase's checkpoint data.
#[async_trait::async_trait]
pub trait PhaseScheduler: Send + Sync {
    async fn schedule_phase(&self, scan: &Scan, phase: ScanPhase) -> ExecuteResult<()>;

    /// Whether `phase` should run for this scan at all, independent of queue
    /// state — used to skip a phase entirely when its audit category is
    /// disabled (`spec.md` §4.G). Defaults to always enabled.
    fn phase_enabled(&self, _scan: &Scan, _phase: ScanPhase) -> bool {
        true
    }
}

/// Drives one scan's phase transitions. Stateless beyond its dependencies —
/// safe to call `advance` repeatedly (e.g. from a poll loop or after a
/// restart) since it always re-derives "is this phase done" from storage.
pub struct PhaseOrchestrator<S, C> {
    store: Arc<S>,
    clock: C,
}

impl<S, C> PhaseOrchestrator<S, C>
where
    S: Store,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Re-evaluate `scan_id`'s current phase. If it has no outstanding jobs,
    /// advance to the next phase (scheduling its jobs via `scheduler`) or, if
    /// the current phase was already `Finished`, mark the scan `Completed`.
    /// No-op for scans that aren't runnable (paused/terminal).
    pub async fn advance(&self, scan_id: ScanId, scheduler: &dyn PhaseScheduler) -> ExecuteResult<()> {
        let Some(scan) = self
            .store
            .get_scan(scan_id)
            .await
            .map_err(|e| sv_core::ExecuteError::Storage(e.to_string()))?
        else {
            return Ok(());
        };

        if !scan.status.is_runnable() {
            return Ok(());
        }

        if scan.phase == ScanPhase::Finished {
            self.finish(scan_id).await?;
            return Ok(());
        }

        let job_type = phase_job_type(scan.phase);
        let outstanding = self
            .store
            .phase_has_outstanding_jobs(scan_id, job_type)
            .await
            .map_err(|e| sv_core::ExecuteError::Storage(e.to_string()))?;
        if outstanding {
            return Ok(());
        }

        let Some(mut next_phase) = scan.phase.next() else {
            self.finish(scan_id).await?;
            return Ok(());
        };

        // Skip phases disabled by the scan's audit-category selection
        // (`spec.md` §4.G) without waiting a poll tick per skipped phase.
        loop {
            tracing::info!(scan = %scan_id, from = %scan.phase, to = %next_phase, "advancing scan phase");
            self.store
                .update_scan_phase(scan_id, next_phase, self.clock.epoch_ms())
                .await
                .map_err(|e| sv_core::ExecuteError::Storage(e.to_string()))?;

            if next_phase == ScanPhase::Finished {
                self.finish(scan_id).await?;
                return Ok(());
            }

            let status = phase_scan_status(next_phase);
            self.store
                .update_scan_status(scan_id, status, self.clock.epoch_ms())
                .await
                .map_err(|e| sv_core::ExecuteError::Storage(e.to_string()))?;

            let scan = self
                .store
                .get_scan(scan_id)
                .await
                .map_err(|e| sv_core::ExecuteError::Storage(e.to_string()))?
                .ok_or_else(|| sv_core::ExecuteError::Storage("scan vanished mid-advance".to_string()))?;

            if scheduler.phase_enabled(&scan, next_phase) {
                return scheduler.schedule_phase(&scan, next_phase).await;
            }

            tracing::info!(scan = %scan_id, phase = %next_phase, "skipping phase, audit category disabled");
            let Some(following) = next_phase.next() else {
                self.finish(scan_id).await?;
                return Ok(());
            };
            next_phase = following;
        }
    }

    async fn finish(&self, scan_id: ScanId) -> ExecuteResult<()> {
        self.store
            .update_scan_status(scan_id, ScanStatus::Completed, self.clock.epoch_ms())
            .await
            .map_err(|e| sv_core::ExecuteError::Storage(e.to_string()))?;
        tracing::info!(scan = %scan_id, "scan completed");
        Ok(())
    }
}

fn phase_job_type(phase: ScanPhase) -> sv_core::JobType {
    use sv_core::JobType;
    match phase {
        ScanPhase::Crawl => JobType::Crawl,
        ScanPhase::Fingerprint => JobType::Fingerprint,
        ScanPhase::Discovery => JobType::Discovery,
        ScanPhase::Nuclei => JobType::Nuclei,
        ScanPhase::ActiveScan => JobType::ActiveScan,
        ScanPhase::Websocket => JobType::WebsocketScan,
        ScanPhase::Finished => JobType::WebsocketScan,
    }
}

fn phase_scan_status(phase: ScanPhase) -> ScanStatus {
    match phase {
        ScanPhase::Crawl => ScanStatus::Crawling,
        _ => ScanStatus::Scanning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::{FakeClock, JobType, ScanStatus, WorkspaceId};
    use sv_storage::MemoryStore;

    struct RecordingScheduler {
        scheduled: parking_lot::Mutex<Vec<ScanPhase>>,
    }

    #[async_trait::async_trait]
    impl PhaseScheduler for RecordingScheduler {
        async fn schedule_phase(&self, _scan: &Scan, phase: ScanPhase) -> ExecuteResult<()> {
            self.scheduled.lock().push(phase);
            Ok(())
        }
    }

    #[tokio::test]
    async fn advance_waits_while_phase_has_outstanding_jobs() {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();
        store.update_scan_status(scan_id, ScanStatus::Crawling, 0).await.unwrap();
        let job = sv_core::test_support::pending_job(scan_id, workspace_id, JobType::Crawl);
        store.enqueue_job(&job).await.unwrap();

        let orchestrator = PhaseOrchestrator::new(store.clone(), FakeClock::new());
        let scheduler = RecordingScheduler { scheduled: parking_lot::Mutex::new(Vec::new()) };
        orchestrator.advance(scan_id, &scheduler).await.unwrap();

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.phase, ScanPhase::Crawl);
        assert!(scheduler.scheduled.lock().is_empty());
    }

    #[tokio::test]
    async fn advance_moves_to_next_phase_once_queue_drains() {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();
        store.update_scan_status(scan_id, ScanStatus::Crawling, 0).await.unwrap();

        let orchestrator = PhaseOrchestrator::new(store.clone(), FakeClock::new());
        let scheduler = RecordingScheduler { scheduled: parking_lot::Mutex::new(Vec::new()) };
        orchestrator.advance(scan_id, &scheduler).await.unwrap();

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.phase, ScanPhase::Fingerprint);
        assert_eq!(scan.status, ScanStatus::Scanning);
        assert_eq!(scheduler.scheduled.lock().as_slice(), &[ScanPhase::Fingerprint]);
    }

    #[tokio::test]
    async fn advance_completes_scan_after_websocket_phase() {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = WorkspaceId::new();
        let mut scan = sv_core::test_support::pending_scan(workspace_id);
        scan.phase = ScanPhase::Websocket;
        scan.status = ScanStatus::Scanning;
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();

        let orchestrator = PhaseOrchestrator::new(store.clone(), FakeClock::new());
        let scheduler = RecordingScheduler { scheduled: parking_lot::Mutex::new(Vec::new()) };
        orchestrator.advance(scan_id, &scheduler).await.unwrap();

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn advance_is_noop_for_paused_scan() {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = WorkspaceId::new();
        let scan = sv_core::test_support::pending_scan(workspace_id);
        let scan_id = scan.id;
        store.create_scan(&scan).await.unwrap();
        store.update_scan_status(scan_id, ScanStatus::Paused, 0).await.unwrap();

        let orchestrator = PhaseOrchestrator::new(store.clone(), FakeClock::new());
        let scheduler = RecordingScheduler { scheduled: parking_lot::Mutex::new(Vec::new()) };
        orchestrator.advance(scan_id, &scheduler).await.unwrap();

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.phase, ScanPhase::Crawl);
        assert!(scheduler.scheduled.lock().is_empty());
    }
}
