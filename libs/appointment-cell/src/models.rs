// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use shared_database::StoreError;
use shared_models::{error::AppError, AppointmentStatus};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Raw booking input. Date and time stay as text until validated so that a
/// missing field and a malformed one produce different messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Option<i64>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    /// `Some` replaces the notes, `None` keeps them.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreatmentRequest {
    pub appointment_id: Option<i64>,
    pub summary: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub treatment_notes: Option<String>,
    pub follow_up_date: Option<String>,
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

/// Named moves of the appointment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Reschedule,
    PatientCancel,
    DoctorComplete,
    DoctorCancel,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Reschedule => "reschedule",
            Transition::PatientCancel => "patient_cancel",
            Transition::DoctorComplete => "doctor_complete",
            Transition::DoctorCancel => "doctor_cancel",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Time slot already booked. Please choose another time.")]
    ConflictDetected,

    #[error("{0}")]
    InvalidStatusTransition(String),

    #[error("Access denied: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub(crate) fn transition_rejected(transition: Transition, from: AppointmentStatus) -> Self {
        let message = match (transition, from) {
            (Transition::Reschedule, _) => "Only booked appointments can be rescheduled".to_string(),
            (Transition::PatientCancel, AppointmentStatus::Cancelled) => {
                "Appointment already cancelled".to_string()
            }
            (_, status) => format!("Cannot {} an appointment that is {}", transition, status),
        };
        AppointmentError::InvalidStatusTransition(message)
    }
}

impl From<StoreError> for AppointmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AppointmentError::NotFound,
            StoreError::UniqueViolation(_) => AppointmentError::ConflictDetected,
            StoreError::StaleWrite(_) => AppointmentError::InvalidStatusTransition(
                "Appointment was changed by another request, please reload it".to_string(),
            ),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AppError> for AppointmentError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::NotFound(_) => AppointmentError::NotFound,
            AppError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            AppError::Authorization(msg) => AppointmentError::Unauthorized(msg),
            AppError::Conflict(_) => AppointmentError::ConflictDetected,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::ConflictDetected => AppError::Conflict(e.to_string()),
            AppointmentError::InvalidStatusTransition(msg) | AppointmentError::ValidationError(msg) => {
                AppError::ValidationError(msg)
            }
            AppointmentError::Unauthorized(msg) => AppError::Authorization(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
