//! Applies `index`/`delete`/`reindex` jobs to an external search index.
//! Bounded to 5 concurrent calls and a token-bucket rate limit, since the
//! index itself is the scarce resource here, not our own CPU.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::Utc;
use config_core::SearchIndexingConfig;
use event_schema::{SearchDeletedPayload, SearchIndexedPayload};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use domain::Job;
use sqlx::PgPool;
use task_queue::TaskQueueRepository;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use transactional_outbox::{publish_event, OutboxRepository};
use uuid::Uuid;

pub const QUEUE: &str = "search-indexing";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Action {
    Index,
    Delete,
    Reindex,
}

#[derive(Debug, Deserialize)]
struct SearchIndexingJobData {
    product_id: Uuid,
    action: Action,
}

/// External search index client, mocked in tests. `reindex` is implemented
/// on top of `delete`+`index` in [`apply`], not here, so a real client only
/// needs the two primitive operations.
#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, product_id: Uuid) -> anyhow::Result<()>;
    async fn delete(&self, product_id: Uuid) -> anyhow::Result<()>;
}

async fn apply<I: SearchIndex>(index: &I, product_id: Uuid, action: Action) -> anyhow::Result<()> {
    match action {
        Action::Index => index.index(product_id).await,
        Action::Delete => index.delete(product_id).await,
        Action::Reindex => {
            index.delete(product_id).await?;
            index.index(product_id).await
        }
    }
}

/// Runner owning the concurrency semaphore, rate limiter, and the outbox
/// connection used to emit `search.indexed.v1`/`search.deleted.v1` after a
/// successful apply.
pub struct SearchIndexingWorker<I: SearchIndex, R: OutboxRepository> {
    pool: PgPool,
    index: Arc<I>,
    outbox: Arc<R>,
    semaphore: Arc<Semaphore>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<I: SearchIndex + 'static, R: OutboxRepository + 'static> SearchIndexingWorker<I, R> {
    pub fn new(pool: PgPool, index: Arc<I>, outbox: Arc<R>, config: &SearchIndexingConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.rate_per_sec.max(1)).unwrap());
        Self {
            pool,
            index,
            outbox,
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn process_one<Q: TaskQueueRepository + 'static>(&self, queue: Arc<Q>, job: Job) {
        let data: SearchIndexingJobData = match serde_json::from_value(job.data.clone()) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "malformed search-indexing job data");
                let _ = queue.fail(job.id, &e.to_string(), 2_000, 32_000).await;
                return;
            }
        };

        self.limiter.until_ready().await;
        let _permit = self.semaphore.clone().acquire_owned().await.expect("semaphore never closed");

        match apply(self.index.as_ref(), data.product_id, data.action).await {
            Ok(()) => {
                if let Err(e) = self.emit_outcome(data.product_id, data.action).await {
                    tracing::error!(job_id = %job.id, error = %e, "search index applied but outbox emit failed");
                    let _ = queue.fail(job.id, &e.to_string(), 2_000, 32_000).await;
                    return;
                }
                let _ = queue.complete(job.id).await;
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, product_id = %data.product_id, error = %e, "search index apply failed");
                let _ = queue.fail(job.id, &e.to_string(), 2_000, 32_000).await;
            }
        }
    }

    async fn emit_outcome(&self, product_id: Uuid, action: Action) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        match action {
            Action::Delete => {
                let payload = SearchDeletedPayload { product_id };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "workers",
                    SearchDeletedPayload::TYPE,
                    serde_json::to_value(&payload)?
                )?;
            }
            Action::Index | Action::Reindex => {
                let payload = SearchIndexedPayload {
                    product_id,
                    indexed_at: Utc::now(),
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "workers",
                    SearchIndexedPayload::TYPE,
                    serde_json::to_value(&payload)?
                )?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Claims and dispatches one batch concurrently, bounded by the
    /// semaphore; returns once every job in the batch has resolved.
    pub async fn run_batch<Q: TaskQueueRepository + 'static>(&self, queue: Arc<Q>, batch_size: i32) -> anyhow::Result<usize>
    where
        Self: Sized,
    {
        let jobs = queue.claim_batch(QUEUE, batch_size).await?;
        let count = jobs.len();

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let queue = queue.clone();
                let worker = self.clone_refs();
                tokio::spawn(async move { worker.process_one(queue, job).await })
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }

        Ok(count)
    }

    /// Runs `run_batch` forever with a fixed poll interval, until `shutdown`
    /// is cancelled.
    pub async fn run_forever<Q: TaskQueueRepository + 'static>(
        &self,
        queue: Arc<Q>,
        batch_size: i32,
        poll_interval: std::time::Duration,
        shutdown: CancellationToken,
    ) {
        while !shutdown.is_cancelled() {
            match self.run_batch(queue.clone(), batch_size).await {
                Ok(0) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "search-indexing batch failed");
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }
    }

    fn clone_refs(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            index: self.index.clone(),
            outbox: self.outbox.clone(),
            semaphore: self.semaphore.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingIndex {
        indexed: AtomicUsize,
        deleted: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SearchIndex for CountingIndex {
        async fn index(&self, _product_id: Uuid) -> anyhow::Result<()> {
            self.indexed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete(&self, _product_id: Uuid) -> anyhow::Result<()> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn reindex_deletes_then_indexes() {
        let index = CountingIndex {
            indexed: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
        };
        apply(&index, Uuid::new_v4(), Action::Reindex).await.unwrap();
        assert_eq!(index.indexed.load(Ordering::SeqCst), 1);
        assert_eq!(index.deleted.load(Ordering::SeqCst), 1);
    }
}
