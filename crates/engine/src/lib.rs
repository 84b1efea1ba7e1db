// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-engine: job execution and scan phase orchestration — the executor
//! registry, worker loop, worker pool, and phase orchestrator.

pub mod executor;
pub mod phase_orchestrator;
pub mod worker;
pub mod worker_pool;

pub use executor::{Executor, ExecutorRegistry};
pub use phase_orchestrator::{PhaseOrchestrator, PhaseScheduler};
pub use worker::Worker;
pub use worker_pool::WorkerPool;
