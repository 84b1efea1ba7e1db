// SPDX-License-Identifier: MIT

//! Postgres-backed [`Store`] implementation. Claims use
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never block on each other,
//! and the stale-recovery sweep gates itself behind a fixed-key advisory
//! lock so only one node in the fleet runs it per tick.

use crate::error::StorageResult;
use crate::store::Store;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use sv_core::{
    JobClaim, JobId, JobStatus, JobTarget, JobType, NodeId, Scan, ScanCheckpoint, ScanCounters,
    ScanId, ScanJob, ScanPhase, ScanStatus, WorkerId, WorkerNode, WorkspaceId,
};

fn epoch_ms_to_datetime(ms: u64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms as i64).unwrap_or_else(chrono::Utc::now)
}

fn datetime_to_epoch_ms(dt: chrono::DateTime<chrono::Utc>) -> u64 {
    dt.timestamp_millis().max(0) as u64
}

fn job_type_str(t: JobType) -> &'static str {
    match t {
        JobType::Crawl => "crawl",
        JobType::Discovery => "discovery",
        JobType::Fingerprint => "fingerprint",
        JobType::ActiveScan => "active_scan",
        JobType::Nuclei => "nuclei",
        JobType::WebsocketScan => "websocket_scan",
    }
}

fn parse_job_type(s: &str) -> StorageResult<JobType> {
    Ok(match s {
        "crawl" => JobType::Crawl,
        "discovery" => JobType::Discovery,
        "fingerprint" => JobType::Fingerprint,
        "active_scan" => JobType::ActiveScan,
        "nuclei" => JobType::Nuclei,
        "websocket_scan" => JobType::WebsocketScan,
        other => {
            return Err(crate::error::StorageError::Database(sqlx::Error::Decode(
                format!("unknown job_type {other:?}").into(),
            )))
        }
    })
}

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Claimed => "claimed",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn parse_job_status(s: &str) -> StorageResult<JobStatus> {
    Ok(match s {
        "pending" => JobStatus::Pending,
        "claimed" => JobStatus::Claimed,
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        other => {
            return Err(crate::error::StorageError::Database(sqlx::Error::Decode(
                format!("unknown job status {other:?}").into(),
            )))
        }
    })
}

fn scan_status_str(s: ScanStatus) -> &'static str {
    match s {
        ScanStatus::Pending => "pending",
        ScanStatus::Crawling => "crawling",
        ScanStatus::Scanning => "scanning",
        ScanStatus::Paused => "paused",
        ScanStatus::Completed => "completed",
        ScanStatus::Cancelled => "cancelled",
        ScanStatus::Failed => "failed",
    }
}

fn parse_scan_status(s: &str) -> StorageResult<ScanStatus> {
    Ok(match s {
        "pending" => ScanStatus::Pending,
        "crawling" => ScanStatus::Crawling,
        "scanning" => ScanStatus::Scanning,
        "paused" => ScanStatus::Paused,
        "completed" => ScanStatus::Completed,
        "cancelled" => ScanStatus::Cancelled,
        "failed" => ScanStatus::Failed,
        other => {
            return Err(crate::error::StorageError::Database(sqlx::Error::Decode(
                format!("unknown scan status {other:?}").into(),
            )))
        }
    })
}

fn scan_phase_str(p: ScanPhase) -> &'static str {
    match p {
        ScanPhase::Crawl => "crawl",
        ScanPhase::Fingerprint => "fingerprint",
        ScanPhase::Discovery => "discovery",
        ScanPhase::Nuclei => "nuclei",
        ScanPhase::ActiveScan => "active_scan",
        ScanPhase::Websocket => "websocket",
        ScanPhase::Finished => "finished",
    }
}

fn parse_scan_phase(s: &str) -> StorageResult<ScanPhase> {
    Ok(match s {
        "crawl" => ScanPhase::Crawl,
        "fingerprint" => ScanPhase::Fingerprint,
        "discovery" => ScanPhase::Discovery,
        "nuclei" => ScanPhase::Nuclei,
        "active_scan" => ScanPhase::ActiveScan,
        "websocket" => ScanPhase::Websocket,
        "finished" => ScanPhase::Finished,
        other => {
            return Err(crate::error::StorageError::Database(sqlx::Error::Decode(
                format!("unknown scan phase {other:?}").into(),
            )))
        }
    })
}

/// Postgres-backed implementation of [`Store`].
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::StorageError::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> StorageResult<ScanJob> {
        let target = JobTarget {
            url: row.get("target_url"),
            method: row.get("target_method"),
            has_query_params: row.get("target_has_query_params"),
            history_id: row.get("target_history_id"),
            websocket_connection_id: row.get("target_websocket_connection_id"),
        };
        let claim = JobClaim {
            worker_id: row.get::<Option<String>, _>("claim_worker_id").map(WorkerId::from_string),
            node_id: row.get::<Option<String>, _>("claim_node_id").map(NodeId::from_string),
            claimed_at_ms: row
                .get::<Option<chrono::DateTime<chrono::Utc>>, _>("claimed_at")
                .map(datetime_to_epoch_ms),
            last_heartbeat_ms: row
                .get::<Option<chrono::DateTime<chrono::Utc>>, _>("last_heartbeat")
                .map(datetime_to_epoch_ms),
        };
        Ok(ScanJob {
            id: JobId::from_string(row.get::<String, _>("job_id")),
            scan_id: ScanId::from_string(row.get::<String, _>("scan_id")),
            workspace_id: WorkspaceId::from_string(row.get::<String, _>("workspace_id")),
            job_type: parse_job_type(row.get("job_type"))?,
            status: parse_job_status(row.get("status"))?,
            priority: row.get("priority"),
            target,
            payload: row.get("payload"),
            claim,
            max_duration_ms: row.get::<i64, _>("max_duration_ms") as u64,
            retry_count: row.get::<i32, _>("retry_count") as u32,
            max_retries: row.get::<i32, _>("max_retries") as u32,
            last_error: row.get("last_error"),
            created_at_ms: datetime_to_epoch_ms(row.get("created_at")),
            updated_at_ms: datetime_to_epoch_ms(row.get("updated_at")),
        })
    }

    fn row_to_scan(row: &sqlx::postgres::PgRow) -> StorageResult<Scan> {
        let checkpoint: serde_json::Value = row.get("checkpoint");
        let options: serde_json::Value = row.get("options");
        let counters: serde_json::Value = row.get("counters");
        Ok(Scan {
            id: ScanId::from_string(row.get::<String, _>("scan_id")),
            workspace_id: WorkspaceId::from_string(row.get::<String, _>("workspace_id")),
            status: parse_scan_status(row.get("status"))?,
            phase: parse_scan_phase(row.get("phase"))?,
            options: serde_json::from_value(options)?,
            isolated: row.get("isolated"),
            checkpoint: serde_json::from_value(checkpoint).unwrap_or_else(|_| ScanCheckpoint::default()),
            counters: serde_json::from_value(counters).unwrap_or_else(|_| ScanCounters::default()),
            started_at_ms: row
                .get::<Option<chrono::DateTime<chrono::Utc>>, _>("started_at")
                .map(datetime_to_epoch_ms),
            updated_at_ms: datetime_to_epoch_ms(row.get("updated_at")),
            created_at_ms: datetime_to_epoch_ms(row.get("created_at")),
        })
    }

    fn row_to_node(row: &sqlx::postgres::PgRow) -> WorkerNode {
        WorkerNode {
            node_id: NodeId::from_string(row.get::<String, _>("node_id")),
            hostname: row.get("hostname"),
            bound_scan_id: row
                .get::<Option<String>, _>("bound_scan_id")
                .map(ScanId::from_string),
            started_at_ms: datetime_to_epoch_ms(row.get("started_at")),
            last_heartbeat_ms: datetime_to_epoch_ms(row.get("last_heartbeat")),
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_scan(&self, scan: &Scan) -> StorageResult<()> {
        let options = serde_json::to_value(&scan.options)?;
        let checkpoint = serde_json::to_value(&scan.checkpoint)?;
        let counters = serde_json::to_value(&scan.counters)?;
        sqlx::query(
            r#"
            INSERT INTO scans (
                scan_id, workspace_id, status, phase, options, isolated,
                checkpoint, counters, started_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(scan.id.as_str())
        .bind(scan.workspace_id.as_str())
        .bind(scan_status_str(scan.status))
        .bind(scan_phase_str(scan.phase))
        .bind(&options)
        .bind(scan.isolated)
        .bind(&checkpoint)
        .bind(&counters)
        .bind(scan.started_at_ms.map(epoch_ms_to_datetime))
        .bind(epoch_ms_to_datetime(scan.created_at_ms))
        .bind(epoch_ms_to_datetime(scan.updated_at_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_scan(&self, scan_id: ScanId) -> StorageResult<Option<Scan>> {
        let row = sqlx::query("SELECT * FROM scans WHERE scan_id = $1")
            .bind(scan_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_scan).transpose()
    }

    async fn update_scan_status(&self, scan_id: ScanId, status: ScanStatus, now_ms: u64) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE scans
            SET status = $2,
                updated_at = $3,
                started_at = COALESCE(started_at, CASE WHEN $2 = 'crawling' THEN $3 END)
            WHERE scan_id = $1
            "#,
        )
        .bind(scan_id.as_str())
        .bind(scan_status_str(status))
        .bind(epoch_ms_to_datetime(now_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_scan_phase(&self, scan_id: ScanId, phase: ScanPhase, now_ms: u64) -> StorageResult<()> {
        sqlx::query("UPDATE scans SET phase = $2, updated_at = $3 WHERE scan_id = $1")
            .bind(scan_id.as_str())
            .bind(scan_phase_str(phase))
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_scan_checkpoint(
        &self,
        scan_id: ScanId,
        checkpoint: &ScanCheckpoint,
        now_ms: u64,
    ) -> StorageResult<()> {
        let value = serde_json::to_value(checkpoint)?;
        sqlx::query("UPDATE scans SET checkpoint = $2, updated_at = $3 WHERE scan_id = $1")
            .bind(scan_id.as_str())
            .bind(&value)
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active_scans(&self, workspace_id: Option<WorkspaceId>) -> StorageResult<Vec<Scan>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scans
            WHERE status NOT IN ('completed', 'cancelled', 'failed')
              AND ($1::text IS NULL OR workspace_id = $1)
            "#,
        )
        .bind(workspace_id.map(|w| w.as_str().to_string()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_scan).collect()
    }

    async fn refresh_scan_counters(&self, scan_id: ScanId) -> StorageResult<()> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN ('pending', 'claimed')) AS pending,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status IN ('failed', 'cancelled')) AS failed
            FROM scan_jobs WHERE scan_id = $1
            "#,
        )
        .bind(scan_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        let counters = ScanCounters {
            pending: row.get::<i64, _>("pending") as u64,
            running: row.get::<i64, _>("running") as u64,
            completed: row.get::<i64, _>("completed") as u64,
            failed: row.get::<i64, _>("failed") as u64,
        };
        let value = serde_json::to_value(counters)?;
        sqlx::query("UPDATE scans SET counters = $2 WHERE scan_id = $1")
            .bind(scan_id.as_str())
            .bind(&value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn enqueue_job(&self, job: &ScanJob) -> StorageResult<()> {
        self.enqueue_jobs(std::slice::from_ref(job)).await
    }

    async fn enqueue_jobs(&self, jobs: &[ScanJob]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for job in jobs {
            sqlx::query(
                r#"
                INSERT INTO scan_jobs (
                    job_id, scan_id, workspace_id, job_type, status, priority,
                    target_url, target_method, target_has_query_params,
                    target_history_id, target_websocket_connection_id,
                    payload, max_duration_ms, retry_count, max_retries,
                    last_error, created_at, updated_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
                ON CONFLICT (scan_id, target_url) WHERE job_type = 'discovery' DO NOTHING
                "#,
            )
            .bind(job.id.as_str())
            .bind(job.scan_id.as_str())
            .bind(job.workspace_id.as_str())
            .bind(job_type_str(job.job_type))
            .bind(job_status_str(job.status))
            .bind(job.priority)
            .bind(&job.target.url)
            .bind(&job.target.method)
            .bind(job.target.has_query_params)
            .bind(&job.target.history_id)
            .bind(&job.target.websocket_connection_id)
            .bind(&job.payload)
            .bind(job.max_duration_ms as i64)
            .bind(job.retry_count as i32)
            .bind(job.max_retries as i32)
            .bind(&job.last_error)
            .bind(epoch_ms_to_datetime(job.created_at_ms))
            .bind(epoch_ms_to_datetime(job.updated_at_ms))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> StorageResult<Option<ScanJob>> {
        let row = sqlx::query("SELECT * FROM scan_jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list_jobs_for_scan(&self, scan_id: ScanId) -> StorageResult<Vec<ScanJob>> {
        let rows = sqlx::query("SELECT * FROM scan_jobs WHERE scan_id = $1")
            .bind(scan_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    async fn claim_next_job(
        &self,
        worker_id: WorkerId,
        node_id: NodeId,
        job_types: &[JobType],
        bound_scan_id: Option<ScanId>,
        now_ms: u64,
    ) -> StorageResult<Option<ScanJob>> {
        let type_filter: Option<Vec<&'static str>> = if job_types.is_empty() {
            None
        } else {
            Some(job_types.iter().copied().map(job_type_str).collect())
        };
        let now = epoch_ms_to_datetime(now_ms);
        let row = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT j.job_id
                FROM scan_jobs j
                JOIN scans s ON s.scan_id = j.scan_id
                WHERE j.status = 'pending'
                  AND s.status IN ('pending', 'crawling', 'scanning')
                  AND ($1::text[] IS NULL OR j.job_type = ANY($1))
                  AND ($2::text IS NULL OR j.scan_id = $2)
                ORDER BY j.priority DESC, j.created_at ASC
                LIMIT 1
                FOR UPDATE OF j SKIP LOCKED
            )
            UPDATE scan_jobs
            SET status = 'claimed',
                claim_worker_id = $3,
                claim_node_id = $4,
                claimed_at = $5,
                last_heartbeat = $5,
                updated_at = $5
            FROM claimable
            WHERE scan_jobs.job_id = claimable.job_id
            RETURNING scan_jobs.*
            "#,
        )
        .bind(type_filter)
        .bind(bound_scan_id.map(|s| s.as_str().to_string()))
        .bind(worker_id.as_str())
        .bind(node_id.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn mark_job_running(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        sqlx::query("UPDATE scan_jobs SET status = 'running', updated_at = $2 WHERE job_id = $1")
            .bind(job_id.as_str())
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'pending', claim_worker_id = NULL, claim_node_id = NULL,
                claimed_at = NULL, last_heartbeat = NULL, updated_at = $2
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .bind(epoch_ms_to_datetime(now_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeat_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        sqlx::query("UPDATE scan_jobs SET last_heartbeat = $2, updated_at = $2 WHERE job_id = $1")
            .bind(job_id.as_str())
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        sqlx::query("UPDATE scan_jobs SET status = 'completed', updated_at = $2 WHERE job_id = $1")
            .bind(job_id.as_str())
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: JobId, error: &str, now_ms: u64) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'failed',
                last_error = $2,
                updated_at = $3
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .bind(error)
        .bind(epoch_ms_to_datetime(now_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_job(&self, job_id: JobId, now_ms: u64) -> StorageResult<()> {
        sqlx::query("UPDATE scan_jobs SET status = 'cancelled', updated_at = $2 WHERE job_id = $1")
            .bind(job_id.as_str())
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_jobs_for_scan(&self, scan_id: ScanId, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let rows = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'cancelled', updated_at = $2
            WHERE scan_id = $1 AND status IN ('pending', 'claimed', 'running')
            RETURNING job_id
            "#,
        )
        .bind(scan_id.as_str())
        .bind(epoch_ms_to_datetime(now_ms))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| JobId::from_string(r.get::<String, _>("job_id"))).collect())
    }

    async fn phase_has_outstanding_jobs(&self, scan_id: ScanId, job_type: JobType) -> StorageResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM scan_jobs
                WHERE scan_id = $1 AND job_type = $2
                  AND status IN ('pending', 'claimed', 'running')
            ) AS outstanding
            "#,
        )
        .bind(scan_id.as_str())
        .bind(job_type_str(job_type))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("outstanding"))
    }

    async fn reset_stale_heartbeat_jobs(&self, threshold_ms: u64, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let now = epoch_ms_to_datetime(now_ms);
        let rows = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'pending', claim_worker_id = NULL, claim_node_id = NULL,
                claimed_at = NULL, last_heartbeat = NULL, updated_at = $2
            WHERE status IN ('claimed', 'running')
              AND COALESCE(last_heartbeat, updated_at) < $2 - ($1 || ' milliseconds')::interval
            RETURNING job_id
            "#,
        )
        .bind(threshold_ms as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| JobId::from_string(r.get::<String, _>("job_id"))).collect())
    }

    async fn reset_timed_out_jobs(&self, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let now = epoch_ms_to_datetime(now_ms);
        let rows = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET retry_count = retry_count + 1,
                updated_at = $1,
                status = CASE WHEN retry_count + 1 >= max_retries THEN 'failed' ELSE 'pending' END,
                claim_worker_id = CASE WHEN retry_count + 1 >= max_retries THEN claim_worker_id ELSE NULL END,
                claim_node_id = CASE WHEN retry_count + 1 >= max_retries THEN claim_node_id ELSE NULL END,
                claimed_at = CASE WHEN retry_count + 1 >= max_retries THEN claimed_at ELSE NULL END,
                last_heartbeat = CASE WHEN retry_count + 1 >= max_retries THEN last_heartbeat ELSE NULL END
            WHERE status IN ('claimed', 'running')
              AND claimed_at IS NOT NULL
              AND claimed_at + (max_duration_ms || ' milliseconds')::interval < $1
            RETURNING job_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| JobId::from_string(r.get::<String, _>("job_id"))).collect())
    }

    async fn reset_orphaned_jobs(&self, now_ms: u64) -> StorageResult<Vec<JobId>> {
        let now = epoch_ms_to_datetime(now_ms);
        let rows = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'pending', claim_worker_id = NULL, claim_node_id = NULL,
                claimed_at = NULL, last_heartbeat = NULL, updated_at = $1
            WHERE status IN ('claimed', 'running')
              AND claim_node_id IS NOT NULL
              AND claim_node_id NOT IN (SELECT node_id FROM worker_nodes)
            RETURNING job_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| JobId::from_string(r.get::<String, _>("job_id"))).collect())
    }

    async fn upsert_worker_node(&self, node: &WorkerNode) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO worker_nodes (node_id, hostname, bound_scan_id, started_at, last_heartbeat)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (node_id) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                bound_scan_id = EXCLUDED.bound_scan_id,
                last_heartbeat = EXCLUDED.last_heartbeat
            "#,
        )
        .bind(node.node_id.as_str())
        .bind(&node.hostname)
        .bind(node.bound_scan_id.map(|s| s.as_str().to_string()))
        .bind(epoch_ms_to_datetime(node.started_at_ms))
        .bind(epoch_ms_to_datetime(node.last_heartbeat_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeat_worker_node(&self, node_id: NodeId, now_ms: u64) -> StorageResult<()> {
        sqlx::query("UPDATE worker_nodes SET last_heartbeat = $2 WHERE node_id = $1")
            .bind(node_id.as_str())
            .bind(epoch_ms_to_datetime(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_worker_nodes(&self) -> StorageResult<Vec<WorkerNode>> {
        let rows = sqlx::query("SELECT * FROM worker_nodes").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_node).collect())
    }

    async fn remove_worker_node(&self, node_id: NodeId) -> StorageResult<()> {
        sqlx::query("DELETE FROM worker_nodes WHERE node_id = $1")
            .bind(node_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_acquire_lock(&self, key: i64) -> StorageResult<bool> {
        let row = sqlx::query("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    async fn release_lock(&self, key: i64) -> StorageResult<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use super::*;
    use sv_core::test_support::{pending_job, pending_scan};
    use sv_core::WorkspaceId;

    async fn setup() -> PostgresStore {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql:///scanvault_test".to_string());
        let store = PostgresStore::connect(&url).await.expect("connect to db");
        store.migrate().await.expect("run migrations");
        sqlx::query("TRUNCATE scan_jobs, scans, worker_nodes CASCADE")
            .execute(&store.pool)
            .await
            .expect("truncate tables");
        store
    }

    #[tokio::test]
    async fn round_trips_a_scan_and_its_jobs() {
        let store = setup().await;
        let workspace_id = WorkspaceId::new();
        let scan = pending_scan(workspace_id);
        store.create_scan(&scan).await.unwrap();

        let job = pending_job(scan.id, workspace_id, JobType::Crawl);
        store.enqueue_job(&job).await.unwrap();

        let loaded_scan = store.get_scan(scan.id).await.unwrap().expect("scan exists");
        assert_eq!(loaded_scan.status, ScanStatus::Pending);

        let loaded_job = store.get_job(job.id).await.unwrap().expect("job exists");
        assert_eq!(loaded_job.job_type, JobType::Crawl);
    }

    #[tokio::test]
    async fn claim_next_job_skip_locked_is_exclusive() {
        let store = setup().await;
        let workspace_id = WorkspaceId::new();
        let scan = pending_scan(workspace_id);
        store.create_scan(&scan).await.unwrap();
        store.update_scan_status(scan.id, ScanStatus::Crawling, 1_000).await.unwrap();
        let job = pending_job(scan.id, workspace_id, JobType::Crawl);
        store.enqueue_job(&job).await.unwrap();

        let claimed = store
            .claim_next_job(WorkerId::new(), NodeId::new(), &[], None, 2_000)
            .await
            .unwrap();
        assert!(claimed.is_some());

        let second = store
            .claim_next_job(WorkerId::new(), NodeId::new(), &[], None, 3_000)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn advisory_lock_round_trips() {
        let store = setup().await;
        assert!(store.try_acquire_lock(999_001).await.unwrap());
        store.release_lock(999_001).await.unwrap();
    }
}
