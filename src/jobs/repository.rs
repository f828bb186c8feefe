use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{Job, JobStatus};

const DEFAULT_MAX_ATTEMPTS: i32 = 25;

const JOB_COLUMNS: &str = "jobs.id, jobs.kind, jobs.payload, jobs.run_at, jobs.attempts, \
     jobs.max_attempts, jobs.backoff_seconds, jobs.status, jobs.last_error, \
     jobs.visibility_till, jobs.reserved_by, jobs.created_at, jobs.updated_at";

/// The jobs table as a queue.
///
/// Delivery is at-least-once: claiming a job marks it running and gives the
/// claimant a visibility window instead of removing the row. A worker that
/// dies mid-job simply lets the window lapse, after which the job is
/// claimable again with its attempt count intact.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        kind: &str,
        payload: Value,
        run_at: Option<DateTime<Utc>>,
        max_attempts: Option<i32>,
    ) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO jobs (kind, payload, run_at, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(kind)
        .bind(payload)
        .bind(run_at.unwrap_or_else(Utc::now))
        .bind(max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Claim up to `limit` due jobs for `worker_id`.
    ///
    /// Due means queued with `run_at` in the past, or running with a lapsed
    /// visibility window. `SKIP LOCKED` lets concurrent workers claim
    /// disjoint batches without blocking each other.
    pub async fn claim_due(
        &self,
        limit: i64,
        worker_id: Uuid,
        visibility_timeout_secs: i64,
    ) -> Result<Vec<Job>> {
        let visibility_till = Utc::now() + chrono::Duration::seconds(visibility_timeout_secs);

        let query = format!(
            "WITH due AS ( \
                 SELECT id FROM jobs \
                 WHERE run_at <= now() \
                   AND (status = 'queued'::job_status \
                        OR (status = 'running'::job_status AND visibility_till < now())) \
                 ORDER BY run_at \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT $1 \
             ) \
             UPDATE jobs \
             SET status = 'running'::job_status, \
                 reserved_by = $2, \
                 visibility_till = $3, \
                 updated_at = now() \
             FROM due \
             WHERE jobs.id = due.id \
             RETURNING {JOB_COLUMNS}"
        );
        let jobs = sqlx::query_as::<_, Job>(&query)
            .bind(limit)
            .bind(worker_id)
            .bind(visibility_till)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    pub async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs \
             SET status = 'succeeded'::job_status, \
                 reserved_by = NULL, \
                 visibility_till = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a failed run. A `next_run_at` puts the job back in the queue
    /// for that time; `None` fails it for good.
    pub async fn fail(
        &self,
        job_id: Uuid,
        error_message: &str,
        next_run_at: Option<DateTime<Utc>>,
        backoff_seconds: i32,
    ) -> Result<()> {
        let status = if next_run_at.is_some() {
            JobStatus::Queued
        } else {
            JobStatus::Failed
        };

        sqlx::query(
            "UPDATE jobs \
             SET status = $2, \
                 attempts = attempts + 1, \
                 last_error = $3, \
                 run_at = COALESCE($4, run_at), \
                 backoff_seconds = $5, \
                 reserved_by = NULL, \
                 visibility_till = NULL, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(status)
        .bind(error_message)
        .bind(next_run_at)
        .bind(backoff_seconds)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Push a running job's visibility window out, for work that outlives
    /// the default lease.
    pub async fn extend_lease(&self, job_id: Uuid, visibility_timeout_secs: i64) -> Result<()> {
        let visibility_till = Utc::now() + chrono::Duration::seconds(visibility_timeout_secs);

        sqlx::query(
            "UPDATE jobs \
             SET visibility_till = $2, updated_at = now() \
             WHERE id = $1 AND status = 'running'::job_status",
        )
        .bind(job_id)
        .bind(visibility_till)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
