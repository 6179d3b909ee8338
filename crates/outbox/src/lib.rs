//! # Transactional Outbox
//!
//! Guarantees that a business write and the events it implies become durable
//! in the same database transaction. A background [`OutboxProcessor`] later
//! claims unsent rows, pushes them to a stream broker, and marks them sent.
//!
//! This gives **at-least-once delivery**: a crash between commit and publish
//! just leaves the row unsent for the next poll. Consumers on the other side
//! dedupe on `event_id` (see `idempotent-consumer`).
//!
//! ## Usage
//!
//! ### 1. Write the event inside the same transaction as the business row
//!
//! ```rust,no_run
//! use transactional_outbox::{OutboxRepository, SqlxOutboxRepository};
//! use event_schema::{EventEnvelope, OrderCreatedPayload};
//! use sqlx::PgPool;
//! use serde_json::json;
//! use uuid::Uuid;
//!
//! async fn create_order(
//!     pool: &PgPool,
//!     outbox: &SqlxOutboxRepository,
//!     order_id: Uuid,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!
//!     sqlx::query("INSERT INTO orders (id, status) VALUES ($1, 'CREATED')")
//!         .bind(order_id)
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     let envelope = EventEnvelope::new(
//!         "order.created.v1",
//!         "order-engine",
//!         json!({ "order_id": order_id }),
//!     );
//!     outbox.write_event(&mut tx, "order.created", &envelope).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Run the publisher loop against a stream broker
//!
//! ```rust,no_run
//! use transactional_outbox::{OutboxProcessor, OutboxPublisher, OutboxResult, SqlxOutboxRepository};
//! use event_schema::EventEnvelope;
//! use async_trait::async_trait;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct NullPublisher;
//!
//! #[async_trait]
//! impl OutboxPublisher for NullPublisher {
//!     async fn publish(&self, _topic: &str, _event: &EventEnvelope) -> OutboxResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::connect("postgresql://localhost/commerce").await?;
//!     let repository = Arc::new(SqlxOutboxRepository::new(pool));
//!     let publisher = Arc::new(NullPublisher);
//!
//!     let processor = OutboxProcessor::new(repository, publisher, 100, Duration::from_secs(5), 5);
//!     processor.start().await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::EventEnvelope;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

mod error;
pub mod macros;
pub mod metrics;

pub use error::{OutboxError, OutboxResult};

/// A row in the outbox table.
///
/// Exactly one of three states holds at any time: unsent and unlocked
/// (`sent_at = None`, `locked = false`), locked by a publisher in flight
/// (`locked = true`), or sent (`sent_at = Some(_)`, never cleared again).
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub topic: String,
    pub event: EventEnvelope,
    pub attempts: i32,
    pub locked: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// A row is in DLQ state once it has exhausted its attempts without
    /// ever being sent. The publisher stops touching it; the DLQ handler
    /// surfaces it for manual replay.
    pub fn is_dlq(&self, max_attempts: i32) -> bool {
        self.sent_at.is_none() && self.attempts >= max_attempts
    }
}

/// Database-backed operations on the outbox table.
///
/// Implementations must guarantee that `write_event` only ever fails if the
/// surrounding transaction fails, and that `claim_batch` hands each row to
/// at most one caller at a time.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Append one event to the outbox inside `tx`. Never called outside a
    /// transaction that also carries the business mutation it describes.
    async fn write_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        topic: &str,
        event: &EventEnvelope,
    ) -> OutboxResult<Uuid>;

    /// Atomically claim up to `limit` unsent, unlocked rows, oldest first.
    /// Rows returned here are now `locked = true` and owned by this caller
    /// until `mark_sent` or `mark_failed` is called.
    async fn claim_batch(&self, limit: i32) -> OutboxResult<Vec<OutboxRecord>>;

    /// Mark a claimed row as delivered. Idempotent: sending twice for an
    /// already-sent row is a no-op, never an error.
    async fn mark_sent(&self, id: Uuid) -> OutboxResult<()>;

    /// Release a claimed row back to the unlocked pool and bump its attempt
    /// counter, making it eligible for the next poll (or DLQ state).
    async fn mark_failed(&self, id: Uuid) -> OutboxResult<()>;

    /// Rows that have exhausted `max_attempts` without ever sending.
    async fn dlq_rows(&self, max_attempts: i32, limit: i32) -> OutboxResult<Vec<OutboxRecord>>;

    /// Pending count and the age in seconds of the oldest pending row (0 if none).
    async fn pending_stats(&self) -> OutboxResult<(i64, i64)>;
}

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<OutboxRecord, sqlx::Error> {
    let payload: Value = row.try_get("payload")?;
    let event: EventEnvelope = serde_json::from_value(payload)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(OutboxRecord {
        id: row.try_get("id")?,
        topic: row.try_get("topic")?,
        event,
        attempts: row.try_get("attempts")?,
        locked: row.try_get("locked")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// SQLx/PostgreSQL implementation of [`OutboxRepository`].
pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        let rec = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS pending,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::BIGINT, 0) AS age_seconds
            FROM outbox_events
            WHERE sent_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("failed to compute outbox pending stats")?;

        let pending: i64 = rec.try_get("pending").unwrap_or(0);
        let age: i64 = rec.try_get("age_seconds").unwrap_or(0);
        Ok((pending, age))
    }

    /// Reset rows created since `ts` back to unsent, for operational replay.
    pub async fn replay_since(&self, ts: DateTime<Utc>) -> OutboxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE outbox_events
            SET sent_at = NULL, locked = false, attempts = 0
            WHERE created_at >= $1 AND sent_at IS NOT NULL
            "#,
        )
        .bind(ts)
        .execute(&self.pool)
        .await
        .context("failed to replay outbox rows since timestamp")?;

        Ok(res.rows_affected())
    }

    /// Reset rows by id range (inclusive), for operational backfill.
    pub async fn replay_range(&self, from_id: Uuid, to_id: Uuid) -> OutboxResult<u64> {
        let res = sqlx::query(
            r#"
            UPDATE outbox_events
            SET sent_at = NULL, locked = false, attempts = 0
            WHERE id BETWEEN $1 AND $2
            "#,
        )
        .bind(from_id)
        .bind(to_id)
        .execute(&self.pool)
        .await
        .context("failed to replay outbox rows by id range")?;

        Ok(res.rows_affected())
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn write_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        topic: &str,
        event: &EventEnvelope,
    ) -> OutboxResult<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(event).context("failed to serialize event envelope")?;

        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, topic, payload, attempts, locked, sent_at, created_at)
            VALUES ($1, $2, $3, 0, false, NULL, NOW())
            "#,
        )
        .bind(id)
        .bind(topic)
        .bind(&payload)
        .execute(&mut **tx)
        .await
        .context("failed to insert outbox row")?;

        debug!(outbox_id = %id, %topic, event_id = %event.event_id, "outbox row written");

        Ok(id)
    }

    async fn claim_batch(&self, limit: i32) -> OutboxResult<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            UPDATE outbox_events
            SET locked = true
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE sent_at IS NULL AND locked = false
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, topic, payload, attempts, locked, sent_at, created_at
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to claim outbox batch")?;

        let records = rows
            .into_iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode claimed outbox rows")?;

        debug!(count = records.len(), "claimed outbox batch");

        Ok(records)
    }

    async fn mark_sent(&self, id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET sent_at = NOW(), locked = false
            WHERE id = $1 AND sent_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark outbox row sent")?;

        if result.rows_affected() == 0 {
            debug!(outbox_id = %id, "mark_sent found no unsent row, treating as already sent");
        }

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET locked = false, attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark outbox row failed")?;

        if result.rows_affected() == 0 {
            warn!(outbox_id = %id, "outbox row not found when marking failed");
            return Err(OutboxError::EventNotFound(id));
        }

        Ok(())
    }

    async fn dlq_rows(&self, max_attempts: i32, limit: i32) -> OutboxResult<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, payload, attempts, locked, sent_at, created_at
            FROM outbox_events
            WHERE sent_at IS NULL AND attempts >= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch outbox DLQ rows")?;

        rows.into_iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode DLQ rows")
            .map_err(Into::into)
    }

    async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
        SqlxOutboxRepository::pending_stats(self).await
    }
}

/// Publishes one event to the stream broker. Implementations must be safe to
/// call twice for the same event (the processor may retry after a failed
/// `mark_sent`).
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> OutboxResult<()>;
}

/// Polls the outbox, claims unsent rows, and publishes them.
///
/// Runs as a single cooperative loop: a batch is claimed, published
/// concurrently row-by-row failures isolated, then fully resolved (sent or
/// unlocked-with-incremented-attempts) before the next sleep. No batch is
/// ever split across a shutdown because claiming and resolving a row is
/// always a single round trip.
pub struct OutboxProcessor<R: OutboxRepository, P: OutboxPublisher> {
    repository: Arc<R>,
    publisher: Arc<P>,
    batch_size: i32,
    poll_interval: Duration,
    max_attempts: i32,
    metrics: Option<crate::metrics::OutboxMetrics>,
}

impl<R: OutboxRepository + 'static, P: OutboxPublisher + 'static> OutboxProcessor<R, P> {
    pub fn new(
        repository: Arc<R>,
        publisher: Arc<P>,
        batch_size: i32,
        poll_interval: Duration,
        max_attempts: i32,
    ) -> Self {
        Self {
            repository,
            publisher,
            batch_size,
            poll_interval,
            max_attempts,
            metrics: None,
        }
    }

    pub fn new_with_metrics(
        repository: Arc<R>,
        publisher: Arc<P>,
        metrics: crate::metrics::OutboxMetrics,
        batch_size: i32,
        poll_interval: Duration,
        max_attempts: i32,
    ) -> Self {
        Self {
            repository,
            publisher,
            batch_size,
            poll_interval,
            max_attempts,
            metrics: Some(metrics),
        }
    }

    /// Runs forever. Should be spawned as a background task; every error is
    /// logged and the loop continues on the next interval.
    pub async fn start(&self) -> Result<()> {
        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            max_attempts = self.max_attempts,
            "outbox publisher starting"
        );

        loop {
            match self.process_batch().await {
                Ok(count) if count > 0 => info!(sent = count, "published outbox batch"),
                Ok(_) => debug!("no outbox rows to publish"),
                Err(e) => error!(error = ?e, "outbox publisher batch failed"),
            }

            if let Some(metrics) = &self.metrics {
                if let Ok((pending, age)) = self.repository.pending_stats().await {
                    metrics.pending.set(pending);
                    metrics.oldest_pending_age_seconds.set(age);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Publishes one claimed row and resolves it (sent, failed, or left DLQ'd
    /// and locked). Takes owned `Arc`s rather than `&self` so it can be
    /// spawned as an independent task per row.
    async fn process_row(
        repository: Arc<R>,
        publisher: Arc<P>,
        metrics: Option<crate::metrics::OutboxMetrics>,
        max_attempts: i32,
        row: OutboxRecord,
    ) -> bool {
        if row.is_dlq(max_attempts) {
            warn!(
                outbox_id = %row.id,
                topic = %row.topic,
                attempts = row.attempts,
                "outbox row reached DLQ state, leaving locked row unsent"
            );
            return false;
        }

        match publisher.publish(&row.topic, &row.event).await {
            Ok(()) => {
                if let Err(e) = repository.mark_sent(row.id).await {
                    error!(outbox_id = %row.id, error = ?e, "publish succeeded but mark_sent failed, row may be resent");
                    false
                } else {
                    if let Some(metrics) = &metrics {
                        metrics.published.inc();
                    }
                    true
                }
            }
            Err(e) => {
                error!(outbox_id = %row.id, topic = %row.topic, attempts = row.attempts, error = ?e, "outbox publish failed");
                if let Err(mark_err) = repository.mark_failed(row.id).await {
                    error!(outbox_id = %row.id, error = ?mark_err, "failed to unlock outbox row after publish failure");
                }
                false
            }
        }
    }

    /// Claims one batch and publishes every row concurrently so a slow or
    /// stuck publish can't serialize the rest of the batch; each row still
    /// resolves independently (sent, failed-and-unlocked, or DLQ'd).
    async fn process_batch(&self) -> OutboxResult<i32> {
        let rows = self.repository.claim_batch(self.batch_size).await?;

        let handles: Vec<_> = rows
            .into_iter()
            .map(|row| {
                let repository = self.repository.clone();
                let publisher = self.publisher.clone();
                let metrics = self.metrics.clone();
                let max_attempts = self.max_attempts;
                tokio::spawn(async move { Self::process_row(repository, publisher, metrics, max_attempts, row).await })
            })
            .collect();

        let mut sent = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                sent += 1;
            }
        }

        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(attempts: i32, sent: bool) -> OutboxRecord {
        OutboxRecord {
            id: Uuid::new_v4(),
            topic: "order.created".to_string(),
            event: EventEnvelope::new("order.created", "order-engine", json!({})),
            attempts,
            locked: false,
            sent_at: if sent { Some(Utc::now()) } else { None },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dlq_state_requires_unsent_and_exhausted_attempts() {
        assert!(!sample_record(0, false).is_dlq(5));
        assert!(!sample_record(4, false).is_dlq(5));
        assert!(sample_record(5, false).is_dlq(5));
        assert!(!sample_record(5, true).is_dlq(5), "a sent row is never in DLQ state");
    }

    struct FakeRepo {
        rows: std::sync::Mutex<std::collections::HashMap<Uuid, OutboxRecord>>,
    }

    impl FakeRepo {
        fn seeded(seqs: &[i32]) -> (Self, Vec<Uuid>) {
            let mut rows = std::collections::HashMap::new();
            let mut ids = Vec::new();
            for &seq in seqs {
                let id = Uuid::new_v4();
                rows.insert(
                    id,
                    OutboxRecord {
                        id,
                        topic: "order.created".to_string(),
                        event: EventEnvelope::new("order.created", "order-engine", json!({ "seq": seq })),
                        attempts: 0,
                        locked: false,
                        sent_at: None,
                        created_at: Utc::now(),
                    },
                );
                ids.push(id);
            }
            (Self { rows: std::sync::Mutex::new(rows) }, ids)
        }
    }

    #[async_trait]
    impl OutboxRepository for FakeRepo {
        async fn write_event(
            &self,
            _tx: &mut Transaction<'_, Postgres>,
            _topic: &str,
            _event: &EventEnvelope,
        ) -> OutboxResult<Uuid> {
            unimplemented!("not exercised by the publisher-cycle test")
        }

        async fn claim_batch(&self, limit: i32) -> OutboxResult<Vec<OutboxRecord>> {
            let mut rows = self.rows.lock().unwrap();
            let mut claimed: Vec<OutboxRecord> = rows
                .values()
                .filter(|r| r.sent_at.is_none() && !r.locked)
                .cloned()
                .collect();
            claimed.sort_by_key(|r| r.created_at);
            claimed.truncate(limit as usize);
            for row in &claimed {
                rows.get_mut(&row.id).unwrap().locked = true;
            }
            Ok(claimed)
        }

        async fn mark_sent(&self, id: Uuid) -> OutboxResult<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.get_mut(&id) {
                row.sent_at = Some(Utc::now());
                row.locked = false;
            }
            Ok(())
        }

        async fn mark_failed(&self, id: Uuid) -> OutboxResult<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.get_mut(&id) {
                row.attempts += 1;
                row.locked = false;
            }
            Ok(())
        }

        async fn dlq_rows(&self, _max_attempts: i32, _limit: i32) -> OutboxResult<Vec<OutboxRecord>> {
            Ok(Vec::new())
        }

        async fn pending_stats(&self) -> OutboxResult<(i64, i64)> {
            Ok((0, 0))
        }
    }

    /// Fails every publish whose payload carries one of `failing_seqs`,
    /// succeeding on everything else.
    struct FlakyPublisher {
        failing_seqs: Vec<i32>,
    }

    #[async_trait]
    impl OutboxPublisher for FlakyPublisher {
        async fn publish(&self, _topic: &str, event: &EventEnvelope) -> OutboxResult<()> {
            let seq = event.payload.get("seq").and_then(|v| v.as_i64()).unwrap_or(-1) as i32;
            if self.failing_seqs.contains(&seq) {
                Err(OutboxError::PublishFailed(format!("broker rejected seq {seq}")))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn partial_publisher_failure_retries_only_the_failed_rows() {
        let seqs: Vec<i32> = (1..=10).collect();
        let (repo, ids) = FakeRepo::seeded(&seqs);
        let repo = Arc::new(repo);
        let publisher = Arc::new(FlakyPublisher { failing_seqs: vec![3, 7] });
        let processor = OutboxProcessor::new(repo.clone(), publisher, 10, Duration::from_secs(5), 5);

        let sent = processor.process_batch().await.unwrap();
        assert_eq!(sent, 8);

        let rows = repo.rows.lock().unwrap();
        for (i, id) in ids.iter().enumerate() {
            let row = &rows[id];
            let seq = i as i32 + 1;
            if seq == 3 || seq == 7 {
                assert!(row.sent_at.is_none(), "seq {seq} should remain unsent");
                assert_eq!(row.attempts, 1);
                assert!(!row.locked, "failed rows must be unlocked for the next poll");
            } else {
                assert!(row.sent_at.is_some(), "seq {seq} should have been published");
            }
        }
    }
}
