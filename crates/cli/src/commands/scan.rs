// SPDX-License-Identifier: MIT

//! `sv scan` — create an isolated scan, run it to completion with a
//! dedicated worker pool, and report on its progress (`spec.md` §6).

use crate::cli::ScanArgs;
use anyhow::Result;
use std::sync::Arc;
use sv_core::{Config, ControlRegistry, ScanOptions, SystemClock, WorkspaceId};
use sv_engine::{ExecutorRegistry, PhaseOrchestrator, WorkerPool};
use sv_manager::ScanManager;
use sv_storage::{MemoryStore, PostgresStore, Store};
use tokio::signal::unix::{signal, SignalKind};

pub async fn run(args: ScanArgs) -> Result<()> {
    let database_url = super::resolve_database_url(args.database_url.clone());
    if database_url.is_empty() {
        tracing::warn!("DATABASE_URL not set, running against an in-memory store (not durable)");
        let store = Arc::new(MemoryStore::new());
        run_with_store(store, args).await
    } else {
        let store = Arc::new(PostgresStore::connect(&database_url).await?);
        store.migrate().await?;
        run_with_store(store, args).await
    }
}

async fn run_with_store<S>(store: Arc<S>, args: ScanArgs) -> Result<()>
where
    S: Store + 'static,
{
    let config = Arc::new(Config { worker_count: args.worker_count, ..Config::default() });
    let control = ControlRegistry::new();
    let clock = SystemClock;
    let manager = ScanManager::new(store.clone(), control.clone(), clock, config.clone());

    let workspace_id = WorkspaceId::from(args.workspace.as_str());
    let options = ScanOptions {
        start_urls: args.urls.clone(),
        max_depth: args.max_depth,
        max_pages_per_site: args.max_pages_per_site,
        ..Default::default()
    };
    let scan = manager.create_scan_record(workspace_id, options, true).await?;
    println!("created scan {}", scan.id);

    let mut pool = WorkerPool::new(store.clone(), ExecutorRegistry::new(), control.clone(), clock, config.clone());
    pool.start(vec![], Some(scan.id)).await?;

    manager.start_scan(scan.id).await?;
    let orchestrator = PhaseOrchestrator::new(store.clone(), clock);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut cancelled = false;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
            _ = sigterm.recv(), if !cancelled => {
                tracing::info!("received SIGTERM, cancelling scan");
                manager.cancel_scan(scan.id).await?;
                cancelled = true;
            }
            _ = sigint.recv(), if !cancelled => {
                tracing::info!("received SIGINT, cancelling scan");
                manager.cancel_scan(scan.id).await?;
                cancelled = true;
            }
        }

        if !cancelled {
            orchestrator.advance(scan.id, &manager).await?;
        }
        let current = manager.scan_snapshot(scan.id).await?;
        println!(
            "phase={} status={} pending={} running={} completed={} failed={}",
            current.phase, current.status, current.counters.pending, current.counters.running,
            current.counters.completed, current.counters.failed,
        );

        if current.status.is_terminal() {
            break;
        }
    }

    println!("scan {} finished, keeping workers up for {}s grace period", scan.id, args.grace_period_secs);
    tokio::time::sleep(std::time::Duration::from_secs(args.grace_period_secs)).await;
    pool.stop().await;
    Ok(())
}
