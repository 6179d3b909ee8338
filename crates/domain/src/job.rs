use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task-queue job state. `waiting`/`delayed` are schedulable, `active` is
/// owned by exactly one worker, `completed`/`failed` are terminal (a failed
/// job re-enters at `waiting` only through the DLQ handler's `retryJob`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub name: String,
    pub data: serde_json::Value,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub backoff_ms: i64,
    pub state: JobState,
    pub next_run_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(attempts_made: i32, max_attempts: i32) -> Job {
        Job {
            id: Uuid::new_v4(),
            queue: "webhook-retry".to_string(),
            name: "process-webhook".to_string(),
            data: serde_json::json!({}),
            attempts_made,
            max_attempts,
            backoff_ms: 2000,
            state: JobState::Waiting,
            next_run_at: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn exhausted_once_attempts_reach_max() {
        assert!(!sample(4, 5).exhausted());
        assert!(sample(5, 5).exhausted());
    }
}
