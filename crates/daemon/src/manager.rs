// SPDX-License-Identifier: MIT

//! The Scan Manager: composition root owning the control registry and the
//! scheduling/lifecycle API (`spec.md` §4.F).
//!
//! Workers and the recovery loop are wired up separately (see the `svd`
//! binary's `main.rs`); the manager itself only touches storage and the
//! in-memory control registry, so it stays cheap to construct and test
//! without spinning up a worker pool.

use crate::error::{ManagerError, ManagerResult};
use std::sync::Arc;
use sv_core::{
    active_scan_priority, Clock, Config, ControlRegistry, JobClaim, JobTarget, JobType, Scan,
    ScanId, ScanJob, ScanOptions, ScanPhase, ScanStatus, WorkspaceId,
};
use sv_core::{ActiveScanPayload, CrawlPayload, DiscoveryPayload, FingerprintPayload, NucleiPayload, WebsocketScanPayload};
use sv_engine::PhaseScheduler;
use sv_storage::Store;

/// A history-item-derived target for an active-scan job, carrying the
/// workspace id of the history item it came from so the manager can
/// validate workspace agreement before enqueueing.
#[derive(Debug, Clone)]
pub struct ActiveScanTarget {
    pub workspace_id: WorkspaceId,
    pub history_id: String,
    pub url: String,
    pub method: String,
    pub has_query_params: bool,
}

/// A websocket-connection-derived target, same workspace-carrying shape as
/// [`ActiveScanTarget`].
#[derive(Debug, Clone)]
pub struct WebsocketTarget {
    pub workspace_id: WorkspaceId,
    pub connection_id: String,
}

pub struct ScanManager<S, C> {
    store: Arc<S>,
    control: ControlRegistry,
    clock: C,
    config: Arc<Config>,
}

impl<S, C> Clone for ScanManager<S, C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            control: self.control.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, C> ScanManager<S, C>
where
    S: Store,
    C: Clock,
{
    pub fn new(store: Arc<S>, control: ControlRegistry, clock: C, config: Arc<Config>) -> Self {
        Self { store, control, clock, config }
    }

    pub fn control(&self) -> &ControlRegistry {
        &self.control
    }

    // ── Recovery ──

    /// Reconcile the in-memory control registry with persisted scan status
    /// for every non-terminal scan. Call once at startup before the worker
    /// pool begins claiming jobs.
    pub async fn recover(&self) -> ManagerResult<()> {
        let scans = self.store.list_active_scans(None).await?;
        for scan in &scans {
            self.control.get_or_insert(scan.id);
            if scan.status == ScanStatus::Paused {
                self.control.pause(scan.id);
            }
        }
        tracing::info!(count = scans.len(), "recovered control registry from persisted scan state");
        Ok(())
    }

    // ── Lifecycle ──

    /// Create a scan and register it as running in the control registry —
    /// the path used when the manager will immediately drive the scan.
    pub async fn create_scan(&self, workspace_id: WorkspaceId, options: ScanOptions, isolated: bool) -> ManagerResult<Scan> {
        let scan = self.create_scan_record(workspace_id, options, isolated).await?;
        self.control.get_or_insert(scan.id);
        Ok(scan)
    }

    /// Insert a pending scan row without touching the control registry —
    /// used by a CLI that creates an isolated scan before the manager (and
    /// its worker pool) even starts.
    pub async fn create_scan_record(&self, workspace_id: WorkspaceId, options: ScanOptions, isolated: bool) -> ManagerResult<Scan> {
        let now_ms = self.clock.epoch_ms();
        let scan = Scan::new(workspace_id, options, isolated, now_ms);
        self.store.create_scan(&scan).await?;
        tracing::info!(scan = %scan.id, workspace = %workspace_id, isolated, "scan created");
        Ok(scan)
    }

    /// Transition a pending scan to running and schedule its first phase
    /// (crawl) from the scan's own `start_urls`.
    pub async fn start_scan(&self, scan_id: ScanId) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        if scan.status != ScanStatus::Pending {
            return Err(ManagerError::InvalidTransition {
                action: "start",
                scan_id: scan_id.to_string(),
                status: status_label(scan.status),
            });
        }
        let now_ms = self.clock.epoch_ms();
        self.store.update_scan_status(scan_id, ScanStatus::Crawling, now_ms).await?;
        self.control.get_or_insert(scan_id);
        let urls = scan.options.start_urls.clone();
        self.schedule_crawl(scan_id, &urls).await?;
        tracing::info!(scan = %scan_id, "scan started");
        Ok(())
    }

    /// Refresh `scan.counters` from current queue state and return the scan.
    /// The counters are eventually consistent (`spec.md` §5) — this is the
    /// read-only snapshot a poller (e.g. `sv-cli`) calls instead of reaching
    /// into storage directly.
    pub async fn scan_snapshot(&self, scan_id: ScanId) -> ManagerResult<Scan> {
        self.store.refresh_scan_counters(scan_id).await?;
        self.require_scan(scan_id).await
    }

    pub async fn pause_scan(&self, scan_id: ScanId) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        if scan.status.is_terminal() {
            return Err(ManagerError::InvalidTransition {
                action: "pause",
                scan_id: scan_id.to_string(),
                status: status_label(scan.status),
            });
        }
        self.store.update_scan_status(scan_id, ScanStatus::Paused, self.clock.epoch_ms()).await?;
        self.control.pause(scan_id);
        tracing::info!(scan = %scan_id, "scan paused");
        Ok(())
    }

    pub async fn resume_scan(&self, scan_id: ScanId) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        if scan.status != ScanStatus::Paused {
            return Err(ManagerError::InvalidTransition {
                action: "resume",
                scan_id: scan_id.to_string(),
                status: status_label(scan.status),
            });
        }
        let resumed_status = if scan.phase == ScanPhase::Crawl { ScanStatus::Crawling } else { ScanStatus::Scanning };
        self.store.update_scan_status(scan_id, resumed_status, self.clock.epoch_ms()).await?;
        self.control.resume(scan_id);
        tracing::info!(scan = %scan_id, "scan resumed");
        Ok(())
    }

    /// Write `cancelled` to the DB, bulk-cancel pending jobs, flip the
    /// in-memory control to cancelled, and schedule the control's
    /// unregistration after `cancel_unregister_delay` so in-flight workers
    /// still have time to observe it.
    pub async fn cancel_scan(&self, scan_id: ScanId) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        if scan.status.is_terminal() {
            return Ok(());
        }
        let now_ms = self.clock.epoch_ms();
        self.store.update_scan_status(scan_id, ScanStatus::Cancelled, now_ms).await?;
        self.store.cancel_jobs_for_scan(scan_id, now_ms).await?;
        self.control.cancel(scan_id);
        tracing::info!(scan = %scan_id, "scan cancelled");

        let control = self.control.clone();
        let delay = self.config.cancel_unregister_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            control.unregister(scan_id);
        });
        Ok(())
    }

    // ── Scheduling ──

    pub async fn schedule_crawl(&self, scan_id: ScanId, urls: &[String]) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        let now_ms = self.clock.epoch_ms();
        let jobs: Vec<ScanJob> = urls
            .iter()
            .map(|url| {
                let payload = CrawlPayload {
                    start_urls: vec![url.clone()],
                    max_depth: scan.options.max_depth,
                    max_pages: scan.options.max_pages_per_site,
                };
                new_job(
                    &scan,
                    JobType::Crawl,
                    sv_core::PRIORITY_CRAWL,
                    JobTarget { url: url.clone(), method: "GET".to_string(), ..Default::default() },
                    payload_value(&payload),
                    job_timeout_ms(&scan, JobType::Crawl),
                    now_ms,
                )
            })
            .collect();
        self.store.enqueue_jobs(&jobs).await?;
        Ok(())
    }

    pub async fn schedule_nuclei(&self, scan_id: ScanId, base_urls: &[String]) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        let now_ms = self.clock.epoch_ms();
        let jobs: Vec<ScanJob> = base_urls
            .iter()
            .map(|url| {
                let payload = NucleiPayload { history_ids: Vec::new(), template_tags: Vec::new() };
                new_job(
                    &scan,
                    JobType::Nuclei,
                    sv_core::PRIORITY_NUCLEI,
                    JobTarget { url: url.clone(), method: "GET".to_string(), ..Default::default() },
                    payload_value(&payload),
                    job_timeout_ms(&scan, JobType::Nuclei),
                    now_ms,
                )
            })
            .collect();
        self.store.enqueue_jobs(&jobs).await?;
        Ok(())
    }

    /// Enqueue one `discovery` job per base URL. Idempotent across
    /// concurrent callers: the store rejects a duplicate `(scan_id,
    /// target_url)` discovery row instead of this method pre-filtering one
    /// (`spec.md` P6) — see `Store::enqueue_jobs`.
    pub async fn schedule_discovery(&self, scan_id: ScanId, base_urls: &[String]) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        let now_ms = self.clock.epoch_ms();

        let jobs: Vec<ScanJob> = base_urls
            .iter()
            .map(|url| {
                let payload = DiscoveryPayload {
                    seed_history_ids: Vec::new(),
                    insertion_points: scan.options.insertion_points.clone(),
                };
                new_job(
                    &scan,
                    JobType::Discovery,
                    sv_core::PRIORITY_DISCOVERY,
                    JobTarget { url: url.clone(), method: "GET".to_string(), ..Default::default() },
                    payload_value(&payload),
                    job_timeout_ms(&scan, JobType::Discovery),
                    now_ms,
                )
            })
            .collect();

        if jobs.is_empty() {
            return Ok(());
        }
        self.store.enqueue_jobs(&jobs).await?;
        Ok(())
    }

    /// Enqueue one `fingerprint` job per history item the crawl phase
    /// produced (`scan.checkpoint.history_ids`).
    pub async fn schedule_fingerprint(&self, scan_id: ScanId, history_ids: &[String]) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        let now_ms = self.clock.epoch_ms();
        let jobs: Vec<ScanJob> = history_ids
            .iter()
            .map(|history_id| {
                let payload = FingerprintPayload { history_id: history_id.clone() };
                new_job(
                    &scan,
                    JobType::Fingerprint,
                    sv_core::PRIORITY_FINGERPRINT,
                    JobTarget { history_id: Some(history_id.clone()), ..Default::default() },
                    payload_value(&payload),
                    job_timeout_ms(&scan, JobType::Fingerprint),
                    now_ms,
                )
            })
            .collect();
        self.store.enqueue_jobs(&jobs).await?;
        Ok(())
    }

    pub async fn schedule_active_scan(&self, scan_id: ScanId, targets: &[ActiveScanTarget]) -> ManagerResult<()> {
        self.schedule_active_scan_with_options(scan_id, targets, &[]).await
    }

    pub async fn schedule_active_scan_with_options(
        &self,
        scan_id: ScanId,
        targets: &[ActiveScanTarget],
        excluded_insertion_points: &[String],
    ) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        self.validate_workspace(scan.workspace_id, targets.iter().map(|t| t.workspace_id))?;

        let insertion_points: Vec<String> = scan
            .options
            .insertion_points
            .iter()
            .filter(|p| !excluded_insertion_points.contains(p))
            .cloned()
            .collect();

        let now_ms = self.clock.epoch_ms();
        let jobs: Vec<ScanJob> = targets
            .iter()
            .map(|target| {
                let payload = ActiveScanPayload {
                    history_id: target.history_id.clone(),
                    insertion_points: insertion_points.clone(),
                    scan_mode: scan.options.scan_mode.map(|m| format!("{:?}", m).to_lowercase()),
                };
                let priority = active_scan_priority(&target.method, target.has_query_params);
                new_job(
                    &scan,
                    JobType::ActiveScan,
                    priority,
                    JobTarget {
                        url: target.url.clone(),
                        method: target.method.clone(),
                        has_query_params: target.has_query_params,
                        history_id: Some(target.history_id.clone()),
                        websocket_connection_id: None,
                    },
                    payload_value(&payload),
                    job_timeout_ms(&scan, JobType::ActiveScan),
                    now_ms,
                )
            })
            .collect();
        self.store.enqueue_jobs(&jobs).await?;
        Ok(())
    }

    pub async fn schedule_websocket_scan(&self, scan_id: ScanId, targets: &[WebsocketTarget]) -> ManagerResult<()> {
        let scan = self.require_scan(scan_id).await?;
        self.validate_workspace(scan.workspace_id, targets.iter().map(|t| t.workspace_id))?;

        let now_ms = self.clock.epoch_ms();
        let jobs: Vec<ScanJob> = targets
            .iter()
            .map(|target| {
                let payload = WebsocketScanPayload {
                    connection_id: target.connection_id.clone(),
                    observation_window_secs: scan.options.websocket.observation_window_secs,
                    replay: scan.options.websocket.replay,
                };
                new_job(
                    &scan,
                    JobType::WebsocketScan,
                    sv_core::PRIORITY_WEBSOCKET,
                    JobTarget {
                        url: String::new(),
                        method: String::new(),
                        has_query_params: false,
                        history_id: None,
                        websocket_connection_id: Some(target.connection_id.clone()),
                    },
                    payload_value(&payload),
                    job_timeout_ms(&scan, JobType::WebsocketScan),
                    now_ms,
                )
            })
            .collect();
        self.store.enqueue_jobs(&jobs).await?;
        Ok(())
    }

    async fn require_scan(&self, scan_id: ScanId) -> ManagerResult<Scan> {
        self.store.get_scan(scan_id).await?.ok_or_else(|| ManagerError::ScanNotFound(scan_id.to_string()))
    }

    fn validate_workspace(&self, scan_workspace: WorkspaceId, items: impl Iterator<Item = WorkspaceId>) -> ManagerResult<()> {
        for workspace_id in items {
            if workspace_id != scan_workspace {
                return Err(ManagerError::WorkspaceMismatch(scan_workspace.to_string(), workspace_id.to_string()));
            }
        }
        Ok(())
    }
}

/// Dispatches each phase transition to the matching `schedule_*` call,
/// reading inputs from the scan's checkpoint — the glue that lets
/// [`sv_engine::PhaseOrchestrator`] drive scheduling without knowing
/// anything about job payload shapes.
#[async_trait::async_trait]
impl<S, C> PhaseScheduler for ScanManager<S, C>
where
    S: Store,
    C: Clock,
{
    async fn schedule_phase(&self, scan: &Scan, phase: ScanPhase) -> sv_core::ExecuteResult<()> {
        let result = match phase {
            ScanPhase::Crawl => self.schedule_crawl(scan.id, &scan.options.start_urls).await,
            ScanPhase::Fingerprint => self.schedule_fingerprint(scan.id, &scan.checkpoint.history_ids).await,
            ScanPhase::Discovery => self.schedule_discovery(scan.id, &scan.checkpoint.history_ids).await,
            ScanPhase::Nuclei => self.schedule_nuclei(scan.id, &scan.checkpoint.history_ids).await,
            ScanPhase::ActiveScan => {
                let targets: Vec<ActiveScanTarget> = scan
                    .checkpoint
                    .history_ids
                    .iter()
                    .map(|history_id| ActiveScanTarget {
                        workspace_id: scan.workspace_id,
                        history_id: history_id.clone(),
                        url: String::new(),
                        method: "GET".to_string(),
                        has_query_params: false,
                    })
                    .collect();
                self.schedule_active_scan(scan.id, &targets).await
            }
            ScanPhase::Websocket => {
                let targets: Vec<WebsocketTarget> = scan
                    .checkpoint
                    .websocket_connection_ids
                    .iter()
                    .map(|connection_id| WebsocketTarget { workspace_id: scan.workspace_id, connection_id: connection_id.clone() })
                    .collect();
                self.schedule_websocket_scan(scan.id, &targets).await
            }
            ScanPhase::Finished => Ok(()),
        };
        result.map_err(|err| match err {
            ManagerError::Execute(e) => e,
            ManagerError::Storage(e) => sv_core::ExecuteError::Storage(e.to_string()),
            other => sv_core::ExecuteError::Storage(other.to_string()),
        })
    }

    /// Crawl and fingerprint always run (they build the history the rest of
    /// the scan needs); discovery/nuclei/active-scan/websocket are audit
    /// work and are skipped entirely when no audit category is enabled
    /// (`spec.md` §4.G).
    fn phase_enabled(&self, scan: &Scan, phase: ScanPhase) -> bool {
        match phase {
            ScanPhase::Crawl | ScanPhase::Fingerprint | ScanPhase::Finished => true,
            ScanPhase::Discovery | ScanPhase::Nuclei | ScanPhase::ActiveScan | ScanPhase::Websocket => {
                scan.options.audit_categories.any_enabled()
            }
        }
    }
}

fn new_job(
    scan: &Scan,
    job_type: JobType,
    priority: i32,
    target: JobTarget,
    payload: serde_json::Value,
    max_duration_ms: u64,
    now_ms: u64,
) -> ScanJob {
    ScanJob {
        id: sv_core::JobId::new(),
        scan_id: scan.id,
        workspace_id: scan.workspace_id,
        job_type,
        status: sv_core::JobStatus::Pending,
        priority,
        target,
        payload,
        claim: JobClaim::default(),
        max_duration_ms,
        retry_count: 0,
        max_retries: scan.options.max_retries,
        last_error: None,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    }
}

fn payload_value(payload: &impl serde::Serialize) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
}

fn job_timeout_ms(scan: &Scan, job_type: JobType) -> u64 {
    let overridden_secs = match job_type {
        JobType::Crawl => scan.options.limits.crawl_timeout_secs,
        JobType::Discovery => scan.options.limits.discovery_timeout_secs,
        JobType::Fingerprint => scan.options.limits.fingerprint_timeout_secs,
        JobType::ActiveScan => scan.options.limits.active_scan_timeout_secs,
        JobType::Nuclei => scan.options.limits.nuclei_timeout_secs,
        JobType::WebsocketScan => scan.options.limits.websocket_timeout_secs,
    };
    match overridden_secs {
        Some(secs) => secs * 1000,
        None => Config::default_job_timeout(job_type).as_millis() as u64,
    }
}

fn status_label(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Pending => "pending",
        ScanStatus::Crawling => "crawling",
        ScanStatus::Scanning => "scanning",
        ScanStatus::Paused => "paused",
        ScanStatus::Completed => "completed",
        ScanStatus::Cancelled => "cancelled",
        ScanStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::{FakeClock, ScanOptions};
    use sv_storage::MemoryStore;

    fn manager() -> ScanManager<MemoryStore, FakeClock> {
        ScanManager::new(Arc::new(MemoryStore::new()), ControlRegistry::new(), FakeClock::new(), Arc::new(Config::default()))
    }

    #[tokio::test]
    async fn create_scan_registers_control_as_running() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan(workspace_id, ScanOptions::default(), false).await.unwrap();

        assert_eq!(mgr.control().get(scan.id).unwrap().state(), sv_core::ControlState::Running);
    }

    #[tokio::test]
    async fn create_scan_record_does_not_touch_control_registry() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan_record(workspace_id, ScanOptions::default(), true).await.unwrap();

        assert!(mgr.control().get(scan.id).is_none());
        assert!(scan.isolated);
    }

    #[tokio::test]
    async fn start_scan_enqueues_crawl_jobs_from_start_urls() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let options = ScanOptions { start_urls: vec!["http://t/".to_string()], ..Default::default() };
        let scan = mgr.create_scan(workspace_id, options, false).await.unwrap();

        mgr.start_scan(scan.id).await.unwrap();

        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::Crawl);
        assert_eq!(jobs[0].priority, sv_core::PRIORITY_CRAWL);
        let reloaded = mgr.store.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ScanStatus::Crawling);
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_status_and_control() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan(workspace_id, ScanOptions::default(), false).await.unwrap();
        mgr.start_scan(scan.id).await.unwrap();

        mgr.pause_scan(scan.id).await.unwrap();
        assert!(mgr.control().get(scan.id).unwrap().is_paused());

        mgr.resume_scan(scan.id).await.unwrap();
        assert!(!mgr.control().get(scan.id).unwrap().is_paused());
        let reloaded = mgr.store.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ScanStatus::Crawling);
    }

    #[tokio::test]
    async fn cancel_scan_cancels_pending_jobs_and_control() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let options = ScanOptions { start_urls: vec!["http://t/".to_string()], ..Default::default() };
        let scan = mgr.create_scan(workspace_id, options, false).await.unwrap();
        mgr.start_scan(scan.id).await.unwrap();

        mgr.cancel_scan(scan.id).await.unwrap();

        let reloaded = mgr.store.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ScanStatus::Cancelled);
        assert!(mgr.control().get(scan.id).unwrap().is_cancelled());
        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == sv_core::JobStatus::Cancelled));
    }

    #[tokio::test]
    async fn schedule_discovery_is_idempotent_for_same_url() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan_record(workspace_id, ScanOptions::default(), false).await.unwrap();

        mgr.schedule_discovery(scan.id, &["http://t/a".to_string()]).await.unwrap();
        mgr.schedule_discovery(scan.id, &["http://t/a".to_string()]).await.unwrap();

        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        assert_eq!(jobs.iter().filter(|j| j.job_type == JobType::Discovery).count(), 1);
    }

    #[tokio::test]
    async fn schedule_fingerprint_enqueues_one_job_per_history_id() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan_record(workspace_id, ScanOptions::default(), false).await.unwrap();

        mgr.schedule_fingerprint(scan.id, &["h1".to_string(), "h2".to_string()]).await.unwrap();

        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        assert_eq!(jobs.iter().filter(|j| j.job_type == JobType::Fingerprint).count(), 2);
        assert!(jobs.iter().all(|j| j.priority == sv_core::PRIORITY_FINGERPRINT));
    }

    #[tokio::test]
    async fn phase_enabled_skips_audit_phases_when_no_category_selected() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan_record(workspace_id, ScanOptions::default(), false).await.unwrap();

        assert!(PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::Crawl));
        assert!(PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::Fingerprint));
        assert!(!PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::Discovery));
        assert!(!PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::ActiveScan));
    }

    #[tokio::test]
    async fn phase_enabled_runs_audit_phases_when_a_category_is_selected() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let options = ScanOptions {
            audit_categories: sv_core::AuditCategories { server_side: true, ..Default::default() },
            ..Default::default()
        };
        let scan = mgr.create_scan_record(workspace_id, options, false).await.unwrap();

        assert!(PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::Discovery));
        assert!(PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::Nuclei));
        assert!(PhaseScheduler::phase_enabled(&mgr, &scan, ScanPhase::Websocket));
    }

    #[tokio::test]
    async fn schedule_active_scan_rejects_cross_workspace_targets() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan_record(workspace_id, ScanOptions::default(), false).await.unwrap();

        let foreign_target = ActiveScanTarget {
            workspace_id: WorkspaceId::new(),
            history_id: "h1".to_string(),
            url: "http://t/".to_string(),
            method: "GET".to_string(),
            has_query_params: false,
        };

        let err = mgr.schedule_active_scan(scan.id, &[foreign_target]).await.unwrap_err();
        assert!(matches!(err, ManagerError::WorkspaceMismatch(_, _)));
        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn schedule_active_scan_bumps_priority_for_non_get() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let scan = mgr.create_scan_record(workspace_id, ScanOptions::default(), false).await.unwrap();

        let target = ActiveScanTarget {
            workspace_id,
            history_id: "h1".to_string(),
            url: "http://t/".to_string(),
            method: "POST".to_string(),
            has_query_params: false,
        };
        mgr.schedule_active_scan(scan.id, &[target]).await.unwrap();

        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        assert_eq!(jobs[0].priority, sv_core::PRIORITY_ACTIVE_SCAN_BASE + sv_core::PRIORITY_ACTIVE_SCAN_BUMP);
    }

    #[tokio::test]
    async fn scan_snapshot_reflects_completed_jobs() {
        let mgr = manager();
        let workspace_id = WorkspaceId::new();
        let options = ScanOptions { start_urls: vec!["http://t/".to_string()], ..Default::default() };
        let scan = mgr.create_scan(workspace_id, options, false).await.unwrap();
        mgr.start_scan(scan.id).await.unwrap();

        let jobs = mgr.store.list_jobs_for_scan(scan.id).await.unwrap();
        mgr.store.complete_job(jobs[0].id, 0).await.unwrap();

        let snapshot = mgr.scan_snapshot(scan.id).await.unwrap();
        assert_eq!(snapshot.counters.completed, 1);
    }

    #[tokio::test]
    async fn pause_scan_on_unknown_id_returns_not_found() {
        let mgr = manager();
        let err = mgr.pause_scan(ScanId::new()).await.unwrap_err();
        assert!(matches!(err, ManagerError::ScanNotFound(_)));
    }
}
