//! Error types shared by every repository in this crate.

use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Record not found for payment intent: {0}")]
    NotFoundByIntentId(String),

    #[error("Optimistic concurrency conflict on {0}")]
    Conflict(Uuid),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
