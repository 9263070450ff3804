use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    /// Free-text specialization, only kept for doctors.
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserSearchQuery {
    pub q: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemStats {
    pub total_doctors: u64,
    pub total_patients: u64,
    pub total_appointments: u64,
    pub booked_appointments: u64,
    pub completed_appointments: u64,
    pub cancelled_appointments: u64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminError {
    #[error("User not found")]
    UserNotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Cannot delete user with active appointments")]
    ActiveAppointments,

    #[error("Unauthorized access: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AdminError::UserNotFound,
            StoreError::UniqueViolation(_) => AdminError::EmailAlreadyExists,
            other => AdminError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AppError> for AdminError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::NotFound(_) => AdminError::UserNotFound,
            AppError::ValidationError(msg) => AdminError::ValidationError(msg),
            AppError::Authorization(msg) => AdminError::Unauthorized(msg),
            AppError::Conflict(_) => AdminError::EmailAlreadyExists,
            other => AdminError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::UserNotFound => AppError::NotFound(e.to_string()),
            AdminError::EmailAlreadyExists | AdminError::ActiveAppointments => {
                AppError::Conflict(e.to_string())
            }
            AdminError::Unauthorized(msg) => AppError::Authorization(msg),
            AdminError::ValidationError(msg) => AppError::ValidationError(msg),
            AdminError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
