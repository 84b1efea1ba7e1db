// SPDX-License-Identifier: MIT

//! The Worker Pool: `N` long-lived tasks sharing one node identity, plus a
//! heartbeat loop (`spec.md` §4.E).
//!
//! Each worker runs its own independent claim/execute loop — this is `N`
//! parallel long-running tasks, not a single scheduler dispatching one task
//! per job. Isolated mode binds every worker in the pool to one scan id so a
//! dedicated pool can be spun up for a single scan without contending with
//! the shared fleet.

use crate::executor::ExecutorRegistry;
use crate::worker::Worker;
use std::sync::Arc;
use sv_core::{Clock, Config, ControlRegistry, JobType, NodeId, ScanId, WorkerId, WorkerNode};
use sv_storage::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running pool of workers sharing one node identity.
pub struct WorkerPool<S, C> {
    node_id: NodeId,
    store: Arc<S>,
    executors: ExecutorRegistry,
    control: ControlRegistry,
    clock: C,
    config: Arc<Config>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    heartbeat_handle: Option<JoinHandle<()>>,
}

impl<S, C> WorkerPool<S, C>
where
    S: Store + 'static,
    C: Clock,
{
    pub fn new(store: Arc<S>, executors: ExecutorRegistry, control: ControlRegistry, clock: C, config: Arc<Config>) -> Self {
        Self {
            node_id: NodeId::new(),
            store,
            executors,
            control,
            clock,
            config,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
            heartbeat_handle: None,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Start `config.worker_count` workers. `job_types` restricts what this
    /// pool's workers claim (empty means any type); `bound_scan_id` pins
    /// every worker to one scan (isolated mode).
    pub async fn start(&mut self, job_types: Vec<JobType>, bound_scan_id: Option<ScanId>) -> sv_storage::StorageResult<()> {
        let hostname = hostname_or_unknown();
        let node = WorkerNode {
            node_id: self.node_id,
            hostname,
            bound_scan_id,
            started_at_ms: self.clock.epoch_ms(),
            last_heartbeat_ms: self.clock.epoch_ms(),
        };
        self.store.upsert_worker_node(&node).await?;

        for i in 0..self.config.worker_count {
            let worker = Worker::new(
                WorkerId::from_string(format!("{}-{}-{}", self.config.worker_id_prefix, self.node_id.as_str(), i)),
                self.node_id,
                self.store.clone(),
                self.executors.clone(),
                self.control.clone(),
                self.clock.clone(),
                self.config.clone(),
                job_types.clone(),
                bound_scan_id,
            );
            let shutdown = self.shutdown.clone();
            self.handles.push(tokio::spawn(async move { worker.run(shutdown).await }));
        }

        self.heartbeat_handle = Some(self.spawn_heartbeat());
        tracing::info!(node = %self.node_id, workers = self.config.worker_count, "worker pool started");
        Ok(())
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let node_id = self.node_id;
        let clock = self.clock.clone();
        let interval = self.config.heartbeat_interval;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.cancelled() => return,
                }
                if let Err(err) = store.heartbeat_worker_node(node_id, clock.epoch_ms()).await {
                    tracing::warn!(node = %node_id, error = %err, "heartbeat failed");
                }
            }
        })
    }

    /// Signal every worker to stop after its current job, then wait for them
    /// to drain.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        if let Some(handle) = self.heartbeat_handle.take() {
            let _ = handle.await;
        }
        if let Err(err) = self.store.remove_worker_node(self.node_id).await {
            tracing::warn!(node = %self.node_id, error = %err, "remove_worker_node failed");
        }
        tracing::info!(node = %self.node_id, "worker pool stopped");
    }
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_storage::MemoryStore;

    #[tokio::test]
    async fn start_registers_node_and_stop_removes_it() {
        let store = Arc::new(MemoryStore::new());
        let mut pool = WorkerPool::new(
            store.clone(),
            ExecutorRegistry::new(),
            ControlRegistry::new(),
            sv_core::FakeClock::new(),
            Arc::new(Config { worker_count: 2, ..Config::default() }),
        );
        pool.start(vec![], None).await.unwrap();

        let nodes = store.list_worker_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id, pool.node_id());

        pool.stop().await;
        let nodes = store.list_worker_nodes().await.unwrap();
        assert!(nodes.is_empty());
    }
}
