//! # Task Queue
//!
//! A Postgres-backed job queue for the background worker plane (webhook
//! retry, search indexing, payment reconciliation). Jobs live in one table
//! and move through `waiting -> active -> completed`, with a `delayed`
//! detour for backoff and a terminal `failed` state once a job exhausts its
//! attempts, at which point the DLQ operations below are the only way back
//! to `waiting`.
//!
//! Claiming reuses the `FOR UPDATE SKIP LOCKED` pattern `transactional-outbox`
//! uses to hand each row to exactly one worker without a separate lock table.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use task_queue::{SqlxTaskQueueRepository, TaskQueueRepository};
//! use sqlx::PgPool;
//! use serde_json::json;
//!
//! async fn enqueue_webhook_retry(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = SqlxTaskQueueRepository::new(pool.clone());
//!     queue
//!         .enqueue("webhook-retry", "deliver-webhook", json!({ "payment_id": "..." }), 5, None)
//!         .await?;
//!     Ok(())
//! }
//! ```

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use domain::{Job, JobState};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

mod backoff;
mod error;
pub mod metrics;

pub use backoff::exponential_backoff_ms;
pub use error::{TaskQueueError, TaskQueueResult};

/// Job counts by state for one queue, as surfaced by the worker health
/// aggregator (degraded once `waiting > 100`, `failed > 50`, or
/// `delayed > 1000`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueCounts {
    pub const WAITING_DEGRADED_THRESHOLD: i64 = 100;
    pub const FAILED_DEGRADED_THRESHOLD: i64 = 50;
    pub const DELAYED_DEGRADED_THRESHOLD: i64 = 1000;

    pub fn is_degraded(&self) -> bool {
        self.waiting > Self::WAITING_DEGRADED_THRESHOLD
            || self.failed > Self::FAILED_DEGRADED_THRESHOLD
            || self.delayed > Self::DELAYED_DEGRADED_THRESHOLD
    }
}

/// Database-backed operations on the job queue.
#[async_trait]
pub trait TaskQueueRepository: Send + Sync {
    /// Insert a new job. `run_at` in the past or `None` makes it
    /// immediately claimable; a future `run_at` enqueues it `delayed`.
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        data: Value,
        max_attempts: i32,
        run_at: Option<DateTime<Utc>>,
    ) -> TaskQueueResult<Uuid>;

    /// Atomically claim up to `limit` runnable jobs from `queue`, oldest
    /// first. Claimed jobs move to `active` and belong to this caller until
    /// [`complete`](TaskQueueRepository::complete) or
    /// [`fail`](TaskQueueRepository::fail) resolves them.
    async fn claim_batch(&self, queue: &str, limit: i32) -> TaskQueueResult<Vec<Job>>;

    /// Mark a claimed job done.
    async fn complete(&self, id: Uuid) -> TaskQueueResult<()>;

    /// Record a failed attempt. Reschedules into `delayed` with exponential
    /// backoff until `max_attempts` is reached, then moves to `failed`
    /// (DLQ) and stops touching it.
    async fn fail(
        &self,
        id: Uuid,
        reason: &str,
        base_backoff_ms: i64,
        cap_backoff_ms: i64,
    ) -> TaskQueueResult<()>;

    /// DLQ: jobs in `failed` state for `queue`, most recently failed first.
    async fn failed_jobs(&self, queue: &str, limit: i32) -> TaskQueueResult<Vec<Job>>;

    /// DLQ: move a failed job back to `waiting`, resetting its attempt
    /// counter and failure reason.
    async fn retry_job(&self, id: Uuid) -> TaskQueueResult<()>;

    /// DLQ: permanently delete a failed job.
    async fn remove_failed_job(&self, id: Uuid) -> TaskQueueResult<()>;

    /// DLQ: failed job count per queue, for the monitoring sweep.
    async fn failed_counts(&self) -> TaskQueueResult<Vec<(String, i64)>>;

    /// Job counts by state for one queue.
    async fn queue_counts(&self, queue: &str) -> TaskQueueResult<QueueCounts>;
}

fn row_to_job(row: sqlx::postgres::PgRow) -> Result<Job, sqlx::Error> {
    Ok(Job {
        id: row.try_get("id")?,
        queue: row.try_get("queue")?,
        name: row.try_get("name")?,
        data: row.try_get("data")?,
        attempts_made: row.try_get("attempts_made")?,
        max_attempts: row.try_get("max_attempts")?,
        backoff_ms: row.try_get("backoff_ms")?,
        state: row.try_get("state")?,
        next_run_at: row.try_get("next_run_at")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// SQLx/PostgreSQL implementation of [`TaskQueueRepository`].
pub struct SqlxTaskQueueRepository {
    pool: PgPool,
}

impl SqlxTaskQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueueRepository for SqlxTaskQueueRepository {
    async fn enqueue(
        &self,
        queue: &str,
        name: &str,
        data: Value,
        max_attempts: i32,
        run_at: Option<DateTime<Utc>>,
    ) -> TaskQueueResult<Uuid> {
        let id = Uuid::new_v4();
        let state = if run_at.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };

        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, queue, name, data, attempts_made, max_attempts, backoff_ms,
                 state, next_run_at, failure_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, 2000, $6, $7, NULL, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(queue)
        .bind(name)
        .bind(&data)
        .bind(max_attempts)
        .bind(state)
        .bind(run_at)
        .execute(&self.pool)
        .await
        .context("failed to enqueue job")?;

        Ok(id)
    }

    async fn claim_batch(&self, queue: &str, limit: i32) -> TaskQueueResult<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'active', updated_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND state IN ('waiting', 'delayed')
                  AND (next_run_at IS NULL OR next_run_at <= NOW())
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue, name, data, attempts_made, max_attempts, backoff_ms,
                      state, next_run_at, failure_reason, created_at, updated_at
            "#,
        )
        .bind(queue)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to claim job batch")?;

        rows.into_iter()
            .map(row_to_job)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode claimed jobs")
            .map_err(Into::into)
    }

    async fn complete(&self, id: Uuid) -> TaskQueueResult<()> {
        let result = sqlx::query(
            r#"UPDATE jobs SET state = 'completed', updated_at = NOW() WHERE id = $1"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to complete job")?;

        if result.rows_affected() == 0 {
            return Err(TaskQueueError::JobNotFound(id));
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: Uuid,
        reason: &str,
        base_backoff_ms: i64,
        cap_backoff_ms: i64,
    ) -> TaskQueueResult<()> {
        let mut tx = self.pool.begin().await.context("failed to start transaction")?;

        let row = sqlx::query("SELECT attempts_made, max_attempts FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to load job for failure")?
            .ok_or(TaskQueueError::JobNotFound(id))?;

        let attempts_made: i32 = row.try_get("attempts_made")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;
        let next_attempt = attempts_made + 1;

        if next_attempt >= max_attempts {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'failed', attempts_made = $2, failure_reason = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(next_attempt)
            .bind(reason)
            .execute(&mut *tx)
            .await
            .context("failed to move job to failed state")?;
        } else {
            let delay_ms = exponential_backoff_ms(next_attempt, base_backoff_ms, cap_backoff_ms);
            let next_run_at = Utc::now() + ChronoDuration::milliseconds(delay_ms);

            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'delayed', attempts_made = $2, failure_reason = $3,
                    next_run_at = $4, backoff_ms = $5, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(next_attempt)
            .bind(reason)
            .bind(next_run_at)
            .bind(delay_ms)
            .execute(&mut *tx)
            .await
            .context("failed to reschedule job")?;
        }

        tx.commit().await.context("failed to commit job failure")?;
        Ok(())
    }

    async fn failed_jobs(&self, queue: &str, limit: i32) -> TaskQueueResult<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue, name, data, attempts_made, max_attempts, backoff_ms,
                   state, next_run_at, failure_reason, created_at, updated_at
            FROM jobs
            WHERE queue = $1 AND state = 'failed'
            ORDER BY updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(queue)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch failed jobs")?;

        rows.into_iter()
            .map(row_to_job)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode failed jobs")
            .map_err(Into::into)
    }

    async fn retry_job(&self, id: Uuid) -> TaskQueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'waiting', attempts_made = 0, failure_reason = NULL,
                next_run_at = NULL, updated_at = NOW()
            WHERE id = $1 AND state = 'failed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to retry job")?;

        if result.rows_affected() == 0 {
            return Err(TaskQueueError::JobNotFound(id));
        }
        Ok(())
    }

    async fn remove_failed_job(&self, id: Uuid) -> TaskQueueResult<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND state = 'failed'")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to remove failed job")?;

        if result.rows_affected() == 0 {
            return Err(TaskQueueError::JobNotFound(id));
        }
        Ok(())
    }

    async fn failed_counts(&self) -> TaskQueueResult<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT queue, COUNT(*)::BIGINT AS count FROM jobs WHERE state = 'failed' GROUP BY queue",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to count failed jobs")?;

        rows.into_iter()
            .map(|row| Ok((row.try_get::<String, _>("queue")?, row.try_get::<i64, _>("count")?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode failed job counts")
            .map_err(Into::into)
    }

    async fn queue_counts(&self, queue: &str) -> TaskQueueResult<QueueCounts> {
        let rows = sqlx::query("SELECT state, COUNT(*)::BIGINT AS count FROM jobs WHERE queue = $1 GROUP BY state")
            .bind(queue)
            .fetch_all(&self.pool)
            .await
            .context("failed to count jobs by state")?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let state: JobState = row.try_get("state")?;
            let count: i64 = row.try_get("count")?;
            match state {
                JobState::Waiting => counts.waiting = count,
                JobState::Delayed => counts.delayed = count,
                JobState::Active => counts.active = count,
                JobState::Completed => counts.completed = count,
                JobState::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_once_waiting_exceeds_threshold() {
        let counts = QueueCounts {
            waiting: 101,
            ..Default::default()
        };
        assert!(counts.is_degraded());
    }

    #[test]
    fn healthy_counts_are_not_degraded() {
        let counts = QueueCounts {
            waiting: 10,
            delayed: 5,
            active: 2,
            completed: 1000,
            failed: 1,
        };
        assert!(!counts.is_degraded());
    }

    #[test]
    fn degraded_once_failed_exceeds_threshold() {
        let counts = QueueCounts {
            failed: 51,
            ..Default::default()
        };
        assert!(counts.is_degraded());
    }

    #[test]
    fn degraded_once_delayed_exceeds_threshold() {
        let counts = QueueCounts {
            delayed: 1001,
            ..Default::default()
        };
        assert!(counts.is_degraded());
    }
}
