//! Error types for the task queue.

use thiserror::Error;
use uuid::Uuid;

pub type TaskQueueResult<T> = Result<T, TaskQueueError>;

#[derive(Error, Debug)]
pub enum TaskQueueError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Task queue error: {0}")]
    Other(#[from] anyhow::Error),
}
