use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum JobQueueError {
    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid job status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Worker timeout: operation took longer than {timeout_seconds} seconds")]
    WorkerTimeout { timeout_seconds: u64 },

    #[error("Maximum retry attempts ({max_retries}) exceeded for job {job_id}")]
    MaxRetriesExceeded { job_id: String, max_retries: u32 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Export write failed: {0}")]
    ExportError(String),
}

impl From<StoreError> for JobQueueError {
    fn from(e: StoreError) -> Self {
        JobQueueError::DatabaseError(e.to_string())
    }
}

impl From<std::io::Error> for JobQueueError {
    fn from(e: std::io::Error) -> Self {
        JobQueueError::ExportError(e.to_string())
    }
}

impl From<csv::Error> for JobQueueError {
    fn from(e: csv::Error) -> Self {
        JobQueueError::ExportError(e.to_string())
    }
}

impl From<JobQueueError> for AppError {
    fn from(e: JobQueueError) -> Self {
        match e {
            JobQueueError::JobNotFound(_) => AppError::NotFound(e.to_string()),
            JobQueueError::Unauthorized(msg) => AppError::Authorization(msg),
            JobQueueError::InvalidStatusTransition { .. } | JobQueueError::MaxRetriesExceeded { .. } => {
                AppError::ValidationError(e.to_string())
            }
            JobQueueError::DatabaseError(msg) => AppError::Database(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}
