use serde::{Deserialize, Serialize};
use thiserror::Error;

use job_queue_cell::JobQueueError;
use shared_database::StoreError;
use shared_models::error::AppError;

/// Self-registration payload. Credentials are owned by the identity
/// provider and never reach this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientRegistration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Upcoming appointments shown on the patient dashboard.
pub const UPCOMING_LIMIT: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Unauthorized access: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Job queue error: {0}")]
    QueueError(String),
}

impl From<StoreError> for PatientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => PatientError::NotFound,
            StoreError::UniqueViolation(_) => PatientError::EmailAlreadyExists,
            other => PatientError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AppError> for PatientError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::NotFound(_) => PatientError::NotFound,
            AppError::ValidationError(msg) => PatientError::ValidationError(msg),
            AppError::Authorization(msg) => PatientError::Unauthorized(msg),
            AppError::Conflict(_) => PatientError::EmailAlreadyExists,
            other => PatientError::DatabaseError(other.to_string()),
        }
    }
}

impl From<JobQueueError> for PatientError {
    fn from(e: JobQueueError) -> Self {
        match e {
            JobQueueError::Unauthorized(msg) => PatientError::Unauthorized(msg),
            other => PatientError::QueueError(other.to_string()),
        }
    }
}

impl From<PatientError> for AppError {
    fn from(e: PatientError) -> Self {
        match e {
            PatientError::NotFound => AppError::NotFound(e.to_string()),
            PatientError::EmailAlreadyExists => AppError::Conflict(e.to_string()),
            PatientError::Unauthorized(msg) => AppError::Authorization(msg),
            PatientError::ValidationError(msg) => AppError::ValidationError(msg),
            PatientError::DatabaseError(msg) => AppError::Database(msg),
            PatientError::QueueError(msg) => AppError::Internal(msg),
        }
    }
}
