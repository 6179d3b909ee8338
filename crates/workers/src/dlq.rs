//! Dead-letter queue operations, uniform across every named queue rather
//! than one handler per queue.

use task_queue::{TaskQueueRepository, TaskQueueResult};
use uuid::Uuid;

/// Queues this deployment actually runs. `DlqHandler` rejects any other
/// name with [`UnknownQueue`](DlqError::UnknownQueue) rather than silently
/// querying a queue that was never wired up.
pub const KNOWN_QUEUES: &[&str] = &["webhook-retry", "search-indexing", "payment-reconciliation"];

#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    #[error(transparent)]
    TaskQueue(#[from] task_queue::TaskQueueError),
}

pub struct DlqHandler<Q: TaskQueueRepository> {
    queue: Q,
}

impl<Q: TaskQueueRepository> DlqHandler<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    fn check_known(queue: &str) -> Result<(), DlqError> {
        if KNOWN_QUEUES.contains(&queue) {
            Ok(())
        } else {
            Err(DlqError::UnknownQueue(queue.to_string()))
        }
    }

    pub async fn failed_jobs(&self, queue: &str, limit: i32) -> Result<Vec<domain::Job>, DlqError> {
        Self::check_known(queue)?;
        Ok(self.queue.failed_jobs(queue, limit).await?)
    }

    /// Moves a failed job back to `waiting`. The job's retry counter resets
    /// on the way back in — a retried job gets its full `max_attempts` run
    /// again, not the remainder of the original budget.
    pub async fn retry_job(&self, queue: &str, id: Uuid) -> Result<(), DlqError> {
        Self::check_known(queue)?;
        self.queue.retry_job(id).await?;
        Ok(())
    }

    pub async fn remove_failed_job(&self, queue: &str, id: Uuid) -> Result<(), DlqError> {
        Self::check_known(queue)?;
        self.queue.remove_failed_job(id).await?;
        Ok(())
    }

    pub async fn failed_counts(&self) -> TaskQueueResult<Vec<(String, i64)>> {
        self.queue.failed_counts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_queue_names() {
        assert!(DlqHandler::<task_queue::SqlxTaskQueueRepository>::check_known("webhook-retry").is_ok());
        assert!(matches!(
            DlqHandler::<task_queue::SqlxTaskQueueRepository>::check_known("not-a-queue"),
            Err(DlqError::UnknownQueue(_))
        ));
    }
}
