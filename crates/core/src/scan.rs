// SPDX-License-Identifier: MIT

//! The `Scan` entity — a user-issued assessment of one or more target URLs,
//! composed of phases (`spec.md` §3).

use crate::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

crate::define_id! {
    /// Unique identifier for a scan.
    pub struct ScanId("scn-");
}

/// Top-level scan status. Transitions are monotonic except pause<->resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Crawling,
    Scanning,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    /// A scan in a terminal status never executes another job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Statuses from which the job queue will claim work for this scan.
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Pending | Self::Crawling | Self::Scanning)
    }
}

crate::simple_display! {
    ScanStatus {
        Pending => "pending",
        Crawling => "crawling",
        Scanning => "scanning",
        Paused => "paused",
        Completed => "completed",
        Cancelled => "cancelled",
        Failed => "failed",
    }
}

/// Ordered phase graph a scan advances through (`spec.md` §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Crawl,
    Fingerprint,
    Discovery,
    Nuclei,
    ActiveScan,
    Websocket,
    Finished,
}

impl ScanPhase {
    pub const ORDER: [ScanPhase; 7] = [
        Self::Crawl,
        Self::Fingerprint,
        Self::Discovery,
        Self::Nuclei,
        Self::ActiveScan,
        Self::Websocket,
        Self::Finished,
    ];

    /// The phase that follows this one in the fixed graph, or `None` past `Finished`.
    pub fn next(self) -> Option<ScanPhase> {
        let idx = Self::ORDER.iter().position(|p| *p == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

crate::simple_display! {
    ScanPhase {
        Crawl => "crawl",
        Fingerprint => "fingerprint",
        Discovery => "discovery",
        Nuclei => "nuclei",
        ActiveScan => "active_scan",
        Websocket => "websocket",
        Finished => "finished",
    }
}

/// Scan execution mode, affecting which audit categories/strategies run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Fast,
    Smart,
    Fuzz,
}

/// Which audit category families are enabled for active-scan/discovery phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCategories {
    #[serde(default)]
    pub server_side: bool,
    #[serde(default)]
    pub client_side: bool,
    #[serde(default)]
    pub graphql: bool,
    #[serde(default)]
    pub openapi: bool,
}

impl AuditCategories {
    pub fn any_enabled(&self) -> bool {
        self.server_side || self.client_side || self.graphql || self.openapi
    }
}

/// Per-phase job-timeout overrides and concurrency/RPS caps, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanLimits {
    pub crawl_timeout_secs: Option<u64>,
    pub discovery_timeout_secs: Option<u64>,
    pub fingerprint_timeout_secs: Option<u64>,
    pub active_scan_timeout_secs: Option<u64>,
    pub nuclei_timeout_secs: Option<u64>,
    pub websocket_timeout_secs: Option<u64>,
    pub max_concurrency: Option<u32>,
    pub max_rps: Option<u32>,
}

/// Websocket-phase specific options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsocketOptions {
    pub observation_window_secs: Option<u64>,
    pub run_passive: bool,
    pub replay: bool,
}

/// A snapshot of user-supplied options taken at scan creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    pub start_urls: Vec<String>,
    pub max_depth: u32,
    pub max_pages_global: u32,
    pub max_pages_per_site: u32,
    pub audit_categories: AuditCategories,
    pub scan_mode: Option<ScanMode>,
    pub insertion_points: Vec<String>,
    pub websocket: WebsocketOptions,
    pub extra_headers: BTreeMap<String, String>,
    pub max_retries: u32,
    pub limits: ScanLimits,
}

/// Opaque per-phase progress record carried between phase transitions.
///
/// Populated by executors (crawl writes `history_ids`, fingerprint writes
/// `fingerprint_tags`, discovery appends more `history_ids`) and read by the
/// orchestrator to decide the next phase's inputs. Resumable across restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub history_ids: Vec<String>,
    pub websocket_connection_ids: Vec<String>,
    pub fingerprint_tags: Vec<String>,
    pub site_behavior_probe: Option<serde_json::Value>,
    /// Per-phase cursor used to resume a phase after a crash mid-phase.
    pub phase_cursor: BTreeMap<String, serde_json::Value>,
}

/// Eventually-consistent display counters, maintained by the manager from
/// queue-row transitions. Never authoritative for scheduling decisions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanCounters {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

/// The unit of work ordered by a user (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub workspace_id: WorkspaceId,
    pub status: ScanStatus,
    pub phase: ScanPhase,
    pub options: ScanOptions,
    /// When true, only workers bound to this scan's id may claim its jobs.
    pub isolated: bool,
    pub checkpoint: ScanCheckpoint,
    pub counters: ScanCounters,
    pub started_at_ms: Option<u64>,
    pub updated_at_ms: u64,
    pub created_at_ms: u64,
}

impl Scan {
    pub fn new(workspace_id: WorkspaceId, options: ScanOptions, isolated: bool, now_ms: u64) -> Self {
        Self {
            id: ScanId::new(),
            workspace_id,
            status: ScanStatus::Pending,
            phase: ScanPhase::Crawl,
            options,
            isolated,
            checkpoint: ScanCheckpoint::default(),
            counters: ScanCounters::default(),
            started_at_ms: None,
            updated_at_ms: now_ms,
            created_at_ms: now_ms,
        }
    }
}

crate::builder! {
    pub struct ScanBuilder => Scan {
        set {
            id: ScanId = ScanId::new(),
            workspace_id: WorkspaceId = WorkspaceId::new(),
            status: ScanStatus = ScanStatus::Pending,
            phase: ScanPhase = ScanPhase::Crawl,
            options: ScanOptions = ScanOptions::default(),
            isolated: bool = false,
            checkpoint: ScanCheckpoint = ScanCheckpoint::default(),
            counters: ScanCounters = ScanCounters::default(),
            updated_at_ms: u64 = 0,
            created_at_ms: u64 = 0,
        }
        option {
            started_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_fixed_and_terminates() {
        assert_eq!(ScanPhase::Crawl.next(), Some(ScanPhase::Fingerprint));
        assert_eq!(ScanPhase::Websocket.next(), Some(ScanPhase::Finished));
        assert_eq!(ScanPhase::Finished.next(), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Paused.is_terminal());
        assert!(!ScanStatus::Scanning.is_terminal());
    }

    #[test]
    fn runnable_statuses() {
        assert!(ScanStatus::Pending.is_runnable());
        assert!(ScanStatus::Crawling.is_runnable());
        assert!(ScanStatus::Scanning.is_runnable());
        assert!(!ScanStatus::Paused.is_runnable());
        assert!(!ScanStatus::Cancelled.is_runnable());
    }
}
