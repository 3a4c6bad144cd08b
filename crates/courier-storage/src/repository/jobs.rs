//! Durable job queue backed by the `jobs` table

use crate::db::DatabasePool;
use crate::models::{Job, JobType};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use courier_common::types::JobId;
use courier_common::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// Job queue trait
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job that is due immediately
    async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> Result<JobId>;

    /// Claim up to `limit` due jobs and mark them processing
    async fn reserve(&self, limit: i64) -> Result<Vec<Job>>;

    async fn complete(&self, id: JobId) -> Result<()>;

    /// Put the job back to pending, due after `delay`
    async fn retry(&self, id: JobId, attempts: i32, error: &str, delay: Duration) -> Result<()>;

    async fn fail(&self, id: JobId, error: &str) -> Result<()>;

    /// Return jobs stuck in processing longer than `lease` to pending
    async fn requeue_expired(&self, lease: Duration) -> Result<u64>;
}

/// PostgreSQL job queue
pub struct DbJobQueue {
    pool: DatabasePool,
    max_attempts: i32,
}

impl DbJobQueue {
    pub fn new(pool: DatabasePool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }
}

#[async_trait]
impl JobQueue for DbJobQueue {
    async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> Result<JobId> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts, scheduled_at, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5, $5)
            "#,
        )
        .bind(id)
        .bind(job_type.to_string())
        .bind(&payload)
        .bind(self.max_attempts)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        debug!(job_id = %id, job_type = %job_type, "Enqueued job");
        Ok(id)
    }

    async fn reserve(&self, limit: i64) -> Result<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'processing', started_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending'
                AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))
    }

    async fn complete(&self, id: JobId) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'completed', completed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn retry(&self, id: JobId, attempts: i32, error: &str, delay: Duration) -> Result<()> {
        let scheduled_at = Utc::now() + delay;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                attempts = $2,
                last_error = $3,
                scheduled_at = $4,
                started_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .bind(scheduled_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        info!(
            job_id = %id,
            attempt = attempts + 1,
            scheduled_at = %scheduled_at,
            "Job scheduled for retry"
        );
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn requeue_expired(&self, lease: Duration) -> Result<u64> {
        let cutoff = Utc::now() - lease;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', started_at = NULL
            WHERE status = 'processing' AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Persistence(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
