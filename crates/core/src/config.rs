// SPDX-License-Identifier: MIT

//! Typed runtime configuration for the scan orchestration core.
//!
//! Loading and validating *user-supplied* scan options is out of scope (see
//! `spec.md` §1) — this is the operational configuration the manager, pool,
//! and recovery loops consume: worker counts, polling cadences, thresholds.
//! Every field has a default so a zero-value `Config` is always usable,
//! matching the `DefaultConfig()` convention `spec.md`'s Design Notes call
//! for.

use std::time::Duration;

/// Fixed advisory lock id the stale-job recovery loop tries to acquire.
///
/// A literal constant shared by every node in the fleet — see `spec.md`
/// §4.F. Any node that fails to acquire it on a given tick skips that tick's
/// sweep rather than blocking.
pub const STALE_RECOVERY_LOCK_ID: i64 = 8675309;

/// Flat configuration surface for the scan manager, worker pool, and
/// recovery loops. Read from the environment by the (out-of-scope) CLI /
/// config collaborator and handed in as a typed struct.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Number of workers the pool starts.
    pub worker_count: usize,
    /// Prefix used when generating worker ids (`"{prefix}-{n}"`).
    pub worker_id_prefix: String,
    /// Stable node id. Empty string means "auto-generate and persist".
    pub node_id: String,
    /// Interval between empty-queue claim retries.
    pub poll_interval: Duration,
    /// Interval at which the Control Registry reconciles with DB state.
    pub control_refresh_interval: Duration,
    /// Interval at which a worker polls the DB for its current job's
    /// cancellation state.
    pub job_cancel_poll_interval: Duration,
    /// Age after which a claimed/running job with no heartbeat is stale.
    pub stale_threshold: Duration,
    /// Interval between WorkerNode heartbeat upserts.
    pub heartbeat_interval: Duration,
    /// Interval between stale-job recovery sweeps.
    pub stale_recovery_interval: Duration,
    /// Delay between a scan reaching `Cancelled` and its control being
    /// unregistered from the in-memory registry.
    pub cancel_unregister_delay: Duration,
    /// Interval at which the phase orchestrator re-checks active scans for
    /// phase completion.
    pub phase_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            worker_count: 5,
            worker_id_prefix: "worker".to_string(),
            node_id: String::new(),
            poll_interval: Duration::from_millis(100),
            control_refresh_interval: Duration::from_secs(3),
            job_cancel_poll_interval: Duration::from_secs(3),
            stale_threshold: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(30),
            stale_recovery_interval: Duration::from_secs(30),
            cancel_unregister_delay: Duration::from_secs(5),
            phase_poll_interval: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Default max job duration per job type (`spec.md` §5).
    pub fn default_job_timeout(job_type: crate::job::JobType) -> Duration {
        use crate::job::JobType::*;
        match job_type {
            Crawl => Duration::from_secs(60 * 60),
            Discovery => Duration::from_secs(5 * 60),
            Fingerprint => Duration::from_secs(5 * 60),
            ActiveScan => Duration::from_secs(30 * 60),
            Nuclei => Duration::from_secs(20 * 60),
            WebsocketScan => Duration::from_secs(15 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobType;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.worker_count, 5);
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.control_refresh_interval, Duration::from_secs(3));
        assert_eq!(cfg.stale_threshold, Duration::from_secs(120));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.stale_recovery_interval, Duration::from_secs(30));
    }

    #[test]
    fn per_job_type_timeouts_match_spec() {
        assert_eq!(Config::default_job_timeout(JobType::Crawl), Duration::from_secs(3600));
        assert_eq!(Config::default_job_timeout(JobType::Discovery), Duration::from_secs(300));
        assert_eq!(Config::default_job_timeout(JobType::ActiveScan), Duration::from_secs(1800));
        assert_eq!(Config::default_job_timeout(JobType::Nuclei), Duration::from_secs(1200));
        assert_eq!(Config::default_job_timeout(JobType::WebsocketScan), Duration::from_secs(900));
    }
}
