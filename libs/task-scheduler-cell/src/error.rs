use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Fire time {fire_at} is in the past")]
    InvalidFireTime { fire_at: DateTime<Utc> },

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Task timed out after {timeout_seconds} seconds")]
    TaskTimeout { timeout_seconds: u64 },

    #[error("Maximum attempts ({max_attempts}) exhausted for task {task_id}")]
    AttemptsExhausted { task_id: String, max_attempts: u32 },

    #[error("No handler registered for task kind {0}")]
    NoHandler(String),

    #[error("Task handler failed: {0}")]
    HandlerFailed(String),
}
