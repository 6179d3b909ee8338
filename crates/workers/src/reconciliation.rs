//! Periodically re-checks payments that haven't reached a terminal state,
//! in case a webhook was lost. `Payment Coordinator::reconcile` already
//! knows how to skip terminal payments and never throws on a provider
//! error, so this worker is just the queue-draining loop around it.

use std::sync::Arc;

use payment_coordinator::{PaymentCoordinator, PaymentProvider};
use serde::Deserialize;
use task_queue::TaskQueueRepository;
use tokio_util::sync::CancellationToken;
use transactional_outbox::OutboxRepository;
use uuid::Uuid;

pub const QUEUE: &str = "payment-reconciliation";

#[derive(Debug, Deserialize)]
struct ReconciliationJobData {
    payment_id: Uuid,
    intent_id: String,
}

pub async fn run_batch<Q, P, R>(
    queue: &Q,
    coordinator: &PaymentCoordinator<P, R>,
    batch_size: i32,
) -> anyhow::Result<usize>
where
    Q: TaskQueueRepository,
    P: PaymentProvider,
    R: OutboxRepository,
{
    let jobs = queue.claim_batch(QUEUE, batch_size).await?;
    let count = jobs.len();

    for job in jobs {
        let data: ReconciliationJobData = match serde_json::from_value(job.data.clone()) {
            Ok(d) => d,
            Err(e) => {
                queue.fail(job.id, &e.to_string(), 5_000, 60_000).await?;
                continue;
            }
        };

        match coordinator.reconcile(data.payment_id, &data.intent_id).await {
            Ok(()) => queue.complete(job.id).await?,
            Err(e) => {
                // `reconcile` maps provider failures to a retryable error;
                // anything else is a defect worth surfacing through the DLQ.
                tracing::warn!(job_id = %job.id, payment_id = %data.payment_id, error = %e, "reconciliation failed");
                queue.fail(job.id, &e.to_string(), 5_000, 60_000).await?;
            }
        }
    }

    Ok(count)
}

pub async fn run_forever<Q, P, R>(
    queue: Arc<Q>,
    coordinator: Arc<PaymentCoordinator<P, R>>,
    batch_size: i32,
    poll_interval: std::time::Duration,
    shutdown: CancellationToken,
) where
    Q: TaskQueueRepository,
    P: PaymentProvider,
    R: OutboxRepository,
{
    while !shutdown.is_cancelled() {
        match run_batch(queue.as_ref(), coordinator.as_ref(), batch_size).await {
            Ok(0) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "reconciliation batch failed");
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }
}
