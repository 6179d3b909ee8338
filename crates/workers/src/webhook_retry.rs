//! Re-delivers webhooks that `ProcessWebhook` failed to apply the first
//! time. Job data carries everything `process_webhook` needs plus enough
//! bookkeeping (`payment_id`, `attempt_number`) to log a useful failure.

use std::sync::Arc;

use payment_coordinator::{PaymentCoordinator, PaymentProvider};
use serde::Deserialize;
use task_queue::TaskQueueRepository;
use tokio_util::sync::CancellationToken;
use transactional_outbox::OutboxRepository;
use uuid::Uuid;

pub const QUEUE: &str = "webhook-retry";

#[derive(Debug, Deserialize)]
struct WebhookRetryJobData {
    payment_id: Uuid,
    payload: serde_json::Value,
    signature: String,
    #[serde(default)]
    attempt_number: i32,
}

/// One claim-process-resolve pass over up to `batch_size` queued jobs.
/// Returns the number claimed, so the caller can decide whether to sleep
/// before polling again.
pub async fn run_batch<Q, P, R>(
    queue: &Q,
    coordinator: &PaymentCoordinator<P, R>,
    batch_size: i32,
    base_backoff_ms: i64,
    cap_backoff_ms: i64,
) -> anyhow::Result<usize>
where
    Q: TaskQueueRepository,
    P: PaymentProvider,
    R: OutboxRepository,
{
    let jobs = queue.claim_batch(QUEUE, batch_size).await?;
    let count = jobs.len();

    for job in jobs {
        let data: WebhookRetryJobData = match serde_json::from_value(job.data.clone()) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "malformed webhook-retry job data, dropping");
                queue.fail(job.id, &e.to_string(), base_backoff_ms, cap_backoff_ms).await?;
                continue;
            }
        };

        let payload_bytes = match serde_json::to_vec(&data.payload) {
            Ok(b) => b,
            Err(e) => {
                queue.fail(job.id, &e.to_string(), base_backoff_ms, cap_backoff_ms).await?;
                continue;
            }
        };

        match coordinator.process_webhook(&payload_bytes, &data.signature).await {
            Ok(_) => {
                tracing::info!(job_id = %job.id, payment_id = %data.payment_id, "webhook redelivery succeeded");
                queue.complete(job.id).await?;
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    payment_id = %data.payment_id,
                    attempt_number = data.attempt_number + 1,
                    error = %e,
                    "webhook redelivery failed, rescheduling"
                );
                queue.fail(job.id, &e.to_string(), base_backoff_ms, cap_backoff_ms).await?;
            }
        }
    }

    Ok(count)
}

/// Runs `run_batch` forever with a fixed poll interval, sleeping only when a
/// batch comes back empty. Returns as soon as `shutdown` is cancelled,
/// finishing whichever batch is already in flight.
pub async fn run_forever<Q, P, R>(
    queue: Arc<Q>,
    coordinator: Arc<PaymentCoordinator<P, R>>,
    batch_size: i32,
    base_backoff_ms: i64,
    cap_backoff_ms: i64,
    poll_interval: std::time::Duration,
    shutdown: CancellationToken,
) where
    Q: TaskQueueRepository,
    P: PaymentProvider,
    R: OutboxRepository,
{
    while !shutdown.is_cancelled() {
        match run_batch(queue.as_ref(), coordinator.as_ref(), batch_size, base_backoff_ms, cap_backoff_ms).await {
            Ok(0) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "webhook-retry batch failed");
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }
}
