// SPDX-License-Identifier: MIT

//! `sv get scans` / `sv get scan-jobs` — read-only queue lookups
//! (`spec.md` §6).

use anyhow::Result;
use std::sync::Arc;
use sv_core::{ScanId, WorkspaceId};
use sv_storage::{MemoryStore, PostgresStore, Store};

pub async fn scans(workspace: Option<String>) -> Result<()> {
    let database_url = super::resolve_database_url(None);
    if database_url.is_empty() {
        print_scans(Arc::new(MemoryStore::new()), workspace).await
    } else {
        let store = PostgresStore::connect(&database_url).await?;
        print_scans(Arc::new(store), workspace).await
    }
}

pub async fn scan_jobs(scan_id: String) -> Result<()> {
    let scan_id = ScanId::from(scan_id.as_str());
    let database_url = super::resolve_database_url(None);
    if database_url.is_empty() {
        print_scan_jobs(Arc::new(MemoryStore::new()), scan_id).await
    } else {
        let store = PostgresStore::connect(&database_url).await?;
        print_scan_jobs(Arc::new(store), scan_id).await
    }
}

async fn print_scans<S: Store>(store: Arc<S>, workspace: Option<String>) -> Result<()> {
    let workspace_id = workspace.map(|w| WorkspaceId::from(w.as_str()));
    let scans = store.list_active_scans(workspace_id).await?;
    if scans.is_empty() {
        println!("no active scans");
        return Ok(());
    }
    for scan in &scans {
        println!(
            "{} workspace={} phase={} status={} isolated={}",
            scan.id, scan.workspace_id, scan.phase, scan.status, scan.isolated
        );
    }
    Ok(())
}

async fn print_scan_jobs<S: Store>(store: Arc<S>, scan_id: ScanId) -> Result<()> {
    let jobs = store.list_jobs_for_scan(scan_id).await?;
    if jobs.is_empty() {
        println!("no jobs for scan {}", scan_id);
        return Ok(());
    }
    for job in &jobs {
        println!(
            "{} type={} status={} priority={} url={} retries={}/{}",
            job.id, job.job_type, job.status, job.priority, job.target.url, job.retry_count, job.max_retries
        );
    }
    Ok(())
}
