// SPDX-License-Identifier: MIT

//! `svd` — the scan manager daemon.
//!
//! Owns one node's worker pool, the stale-job recovery loop, and a
//! phase-advancement poll loop. Executor registration (the individual
//! vulnerability-detection modules) is out of this crate's scope (`spec.md`
//! §1) — a real deployment links a crate that registers its executors into
//! the [`ExecutorRegistry`] before calling [`run`].

use std::sync::Arc;
use sv_core::{Config, ControlRegistry, SystemClock};
use sv_engine::{ExecutorRegistry, PhaseOrchestrator, WorkerPool};
use sv_manager::ScanManager;
use sv_storage::{MemoryStore, PostgresStore, Store};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(load_config());

    match &config.database_url {
        url if !url.is_empty() => {
            tracing::info!("connecting to Postgres");
            let store = PostgresStore::connect(url).await?;
            store.migrate().await?;
            run(Arc::new(store), config).await
        }
        _ => {
            tracing::warn!("DATABASE_URL not set, falling back to an in-memory store (not durable across restarts)");
            run(Arc::new(MemoryStore::new()), config).await
        }
    }
}

fn load_config() -> Config {
    Config {
        database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
        ..Config::default()
    }
}

/// Wire together the manager, worker pool, recovery loop, and phase poll
/// loop for one store backend, then run until a shutdown signal arrives.
async fn run<S>(store: Arc<S>, config: Arc<Config>) -> Result<(), Box<dyn std::error::Error>>
where
    S: Store + 'static,
{
    let control = ControlRegistry::new();
    let clock = SystemClock;
    let manager = ScanManager::new(store.clone(), control.clone(), clock, config.clone());
    manager.recover().await?;

    let recovery = sv_manager::RecoveryLoop::new(store.clone(), clock, config.clone());
    tracing::info!("running initial stale-job sweep before accepting new claims");
    recovery.tick().await;

    let executors = ExecutorRegistry::new();
    let mut pool = WorkerPool::new(store.clone(), executors, control.clone(), clock, config.clone());
    pool.start(vec![], None).await?;

    let shutdown = CancellationToken::new();

    let recovery_shutdown = shutdown.clone();
    let recovery_handle = tokio::spawn(async move { recovery.run(recovery_shutdown).await });

    let orchestrator = PhaseOrchestrator::new(store.clone(), clock);
    let phase_store = store.clone();
    let phase_manager = manager.clone();
    let phase_shutdown = shutdown.clone();
    let phase_interval = config.phase_poll_interval;
    let phase_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(phase_interval) => {}
                _ = phase_shutdown.cancelled() => return,
            }
            match phase_store.list_active_scans(None).await {
                Ok(scans) => {
                    for scan in scans {
                        if let Err(err) = orchestrator.advance(scan.id, &phase_manager).await {
                            tracing::warn!(scan = %scan.id, error = %err, "phase advance failed");
                        }
                    }
                }
                Err(err) => tracing::warn!(error = %err, "list_active_scans failed"),
            }
        }
    });

    tracing::info!(node = %pool.node_id(), "svd ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
    }

    shutdown.cancel();
    pool.stop().await;
    let _ = recovery_handle.await;
    let _ = phase_handle.await;
    tracing::info!("svd stopped");
    Ok(())
}
