// SPDX-License-Identifier: MIT

//! The `ScanJob` entity — a single unit of queued work belonging to a scan
//! (`spec.md` §3, §4.A).

use crate::scan::ScanId;
use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a queued job.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Stable identifier for a worker (persists across restarts within a node).
    pub struct WorkerId("wkr-");
}

crate::define_id! {
    /// Stable identifier for a fleet node (host/process).
    pub struct NodeId("nod-");
}

/// The kind of work a job performs. Determines which executor handles it
/// and which default timeout applies (`spec.md` §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Crawl,
    Discovery,
    Fingerprint,
    ActiveScan,
    Nuclei,
    WebsocketScan,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        Self::Crawl,
        Self::Discovery,
        Self::Fingerprint,
        Self::ActiveScan,
        Self::Nuclei,
        Self::WebsocketScan,
    ];

    /// The scan phase this job type belongs to.
    pub fn phase(self) -> crate::scan::ScanPhase {
        use crate::scan::ScanPhase;
        match self {
            Self::Crawl => ScanPhase::Crawl,
            Self::Fingerprint => ScanPhase::Fingerprint,
            Self::Discovery => ScanPhase::Discovery,
            Self::Nuclei => ScanPhase::Nuclei,
            Self::ActiveScan => ScanPhase::ActiveScan,
            Self::WebsocketScan => ScanPhase::Websocket,
        }
    }
}

crate::simple_display! {
    JobType {
        Crawl => "crawl",
        Discovery => "discovery",
        Fingerprint => "fingerprint",
        ActiveScan => "active_scan",
        Nuclei => "nuclei",
        WebsocketScan => "websocket_scan",
    }
}

/// Base scheduling priority by job type (`spec.md` §4.A — higher runs first).
///
/// `active_scan` jobs get a priority bump (`PRIORITY_ACTIVE_SCAN_BUMP`) for
/// non-GET requests or requests carrying query parameters, since those probes
/// are more likely to surface state-changing vulnerabilities.
pub const PRIORITY_CRAWL: i32 = 20;
pub const PRIORITY_FINGERPRINT: i32 = 15;
pub const PRIORITY_DISCOVERY: i32 = 10;
pub const PRIORITY_NUCLEI: i32 = 5;
pub const PRIORITY_ACTIVE_SCAN_BASE: i32 = 0;
pub const PRIORITY_ACTIVE_SCAN_BUMP: i32 = 2;
pub const PRIORITY_WEBSOCKET: i32 = 0;

/// Compute an `active_scan` job's priority from its target request shape.
pub fn active_scan_priority(method: &str, has_query_params: bool) -> i32 {
    if !method.eq_ignore_ascii_case("GET") || has_query_params {
        PRIORITY_ACTIVE_SCAN_BASE + PRIORITY_ACTIVE_SCAN_BUMP
    } else {
        PRIORITY_ACTIVE_SCAN_BASE
    }
}

/// Lifecycle status of a queued job (`spec.md` §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Claimed,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Statuses counted as "still outstanding" when a phase checks for
    /// completion (`spec.md` §4.G — a phase is done when no job of its type
    /// is pending, claimed, or running).
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Claimed | Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Claimed => "claimed",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// The HTTP request shape a job targets, where applicable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTarget {
    pub url: String,
    pub method: String,
    pub has_query_params: bool,
    pub history_id: Option<String>,
    pub websocket_connection_id: Option<String>,
}

/// Claim metadata attached once a worker picks up a job. Cleared on release.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobClaim {
    pub worker_id: Option<WorkerId>,
    pub node_id: Option<NodeId>,
    pub claimed_at_ms: Option<u64>,
    pub last_heartbeat_ms: Option<u64>,
}

/// A single unit of queued, durable work (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    pub scan_id: ScanId,
    pub workspace_id: WorkspaceId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub target: JobTarget,
    /// Job-type-specific input payload (e.g. crawl depth, discovery seed list).
    pub payload: serde_json::Value,
    pub claim: JobClaim,
    /// Wall-clock budget before the job is considered timed out and reset.
    pub max_duration_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl ScanJob {
    /// True once `retry_count` has exhausted `max_retries` — a further
    /// failure moves the job to `Failed` instead of back to `Pending`.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

crate::builder! {
    pub struct ScanJobBuilder => ScanJob {
        set {
            id: JobId = JobId::new(),
            scan_id: ScanId = ScanId::new(),
            workspace_id: WorkspaceId = WorkspaceId::new(),
            job_type: JobType = JobType::Crawl,
            status: JobStatus = JobStatus::Pending,
            priority: i32 = PRIORITY_CRAWL,
            target: JobTarget = JobTarget::default(),
            payload: serde_json::Value = serde_json::Value::Null,
            claim: JobClaim = JobClaim::default(),
            max_duration_ms: u64 = 3_600_000,
            retry_count: u32 = 0,
            max_retries: u32 = 0,
            created_at_ms: u64 = 0,
            updated_at_ms: u64 = 0,
        }
        option {
            last_error: String = None,
        }
    }
}

/// Crawl-phase job payload (`spec.md` §4.C).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlPayload {
    pub start_urls: Vec<String>,
    pub max_depth: u32,
    pub max_pages: u32,
}

/// Fingerprint-phase job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintPayload {
    pub history_id: String,
}

/// Discovery-phase job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryPayload {
    pub seed_history_ids: Vec<String>,
    pub insertion_points: Vec<String>,
}

/// Nuclei-phase job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NucleiPayload {
    pub history_ids: Vec<String>,
    pub template_tags: Vec<String>,
}

/// Active-scan-phase job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveScanPayload {
    pub history_id: String,
    pub insertion_points: Vec<String>,
    pub scan_mode: Option<String>,
}

/// Websocket-phase job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebsocketScanPayload {
    pub connection_id: String,
    pub observation_window_secs: Option<u64>,
    pub replay: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_scan_priority_bumps_non_get() {
        assert_eq!(active_scan_priority("GET", false), PRIORITY_ACTIVE_SCAN_BASE);
        assert_eq!(
            active_scan_priority("POST", false),
            PRIORITY_ACTIVE_SCAN_BASE + PRIORITY_ACTIVE_SCAN_BUMP
        );
        assert_eq!(
            active_scan_priority("GET", true),
            PRIORITY_ACTIVE_SCAN_BASE + PRIORITY_ACTIVE_SCAN_BUMP
        );
    }

    #[test]
    fn outstanding_statuses() {
        assert!(JobStatus::Pending.is_outstanding());
        assert!(JobStatus::Claimed.is_outstanding());
        assert!(JobStatus::Running.is_outstanding());
        assert!(!JobStatus::Completed.is_outstanding());
        assert!(!JobStatus::Failed.is_outstanding());
    }

    #[test]
    fn job_type_maps_to_phase() {
        assert_eq!(JobType::Crawl.phase(), crate::scan::ScanPhase::Crawl);
        assert_eq!(JobType::WebsocketScan.phase(), crate::scan::ScanPhase::Websocket);
    }

    #[test]
    fn retries_exhausted_boundary() {
        let job = ScanJobBuilder::new().retry_count(2).max_retries(2).build();
        assert!(job.retries_exhausted());
        let job = ScanJobBuilder::new().retry_count(1).max_retries(2).build();
        assert!(!job.retries_exhausted());
    }
}
