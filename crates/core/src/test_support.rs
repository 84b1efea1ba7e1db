// SPDX-License-Identifier: MIT

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::job::{JobId, JobStatus, JobTarget, JobType, ScanJob, ScanJobBuilder};
use crate::scan::{Scan, ScanBuilder, ScanId, ScanOptions, ScanStatus};
use crate::workspace::WorkspaceId;

/// Proptest strategies for core state machine types.
#[cfg(feature = "proptest")]
pub mod strategies {
    use crate::job::{JobStatus, JobType};
    use proptest::prelude::*;

    pub fn arb_job_type() -> impl Strategy<Value = JobType> {
        prop_oneof![
            Just(JobType::Crawl),
            Just(JobType::Discovery),
            Just(JobType::Fingerprint),
            Just(JobType::ActiveScan),
            Just(JobType::Nuclei),
            Just(JobType::WebsocketScan),
        ]
    }

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Claimed),
            Just(JobStatus::Running),
            Just(JobStatus::Completed),
            Just(JobStatus::Failed),
            Just(JobStatus::Cancelled),
        ]
    }
}

/// Build a pending crawl job for a fresh scan/workspace pair.
pub fn pending_job(scan_id: ScanId, workspace_id: WorkspaceId, job_type: JobType) -> ScanJob {
    ScanJobBuilder::new()
        .scan_id(scan_id)
        .workspace_id(workspace_id)
        .job_type(job_type)
        .status(JobStatus::Pending)
        .target(JobTarget {
            url: "https://example.test/".to_string(),
            method: "GET".to_string(),
            has_query_params: false,
            history_id: None,
            websocket_connection_id: None,
        })
        .build()
}

/// Build a job with an explicit id, useful when a test needs to reference
/// the same job across a claim/complete/fail sequence.
pub fn job_with_id(id: &str, scan_id: ScanId, workspace_id: WorkspaceId, job_type: JobType) -> ScanJob {
    ScanJob {
        id: JobId::from_string(id),
        ..pending_job(scan_id, workspace_id, job_type)
    }
}

/// Build a pending scan in a fresh workspace.
pub fn pending_scan(workspace_id: WorkspaceId) -> Scan {
    ScanBuilder::new()
        .workspace_id(workspace_id)
        .status(ScanStatus::Pending)
        .options(ScanOptions {
            start_urls: vec!["https://example.test/".to_string()],
            max_depth: 3,
            max_pages_global: 500,
            max_pages_per_site: 200,
            ..ScanOptions::default()
        })
        .build()
}
