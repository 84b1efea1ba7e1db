// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-core: core domain types for the scan orchestration and job execution
//! subsystem — jobs, scans, worker identity, and the in-memory control
//! registry.
//!
//! This crate has no I/O — persistence lives in `sv-storage`, execution and
//! scheduling in `sv-engine`.

pub mod macros;

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod id;
pub mod job;
pub mod scan;
pub mod worker_node;
pub mod workspace;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, STALE_RECOVERY_LOCK_ID};
pub use control::{ControlRegistry, ControlState, ScanControl};
pub use error::{ExecuteError, ExecuteResult};
pub use job::{
    active_scan_priority, ActiveScanPayload, CrawlPayload, DiscoveryPayload, FingerprintPayload,
    JobClaim, JobId, JobStatus, JobTarget, JobType, NodeId, NucleiPayload, ScanJob,
    ScanJobBuilder, WebsocketScanPayload, WorkerId, PRIORITY_ACTIVE_SCAN_BASE,
    PRIORITY_ACTIVE_SCAN_BUMP, PRIORITY_CRAWL, PRIORITY_DISCOVERY, PRIORITY_FINGERPRINT,
    PRIORITY_NUCLEI, PRIORITY_WEBSOCKET,
};
pub use scan::{
    AuditCategories, Scan, ScanBuilder, ScanCheckpoint, ScanCounters, ScanId, ScanLimits,
    ScanMode, ScanOptions, ScanPhase, ScanStatus, WebsocketOptions,
};
pub use worker_node::WorkerNode;
pub use workspace::WorkspaceId;
