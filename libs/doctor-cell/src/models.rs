use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::{error::AppError, Appointment, TreatmentRecord, User};

// ==============================================================================
// AVAILABILITY
// ==============================================================================

/// One day of a weekly availability submission as received from the caller.
/// A missing or blank start/end marks the day off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityEntry {
    pub day_of_week: i32,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl AvailabilityEntry {
    pub fn new(day_of_week: i32, start_time: &str, end_time: &str) -> Self {
        Self {
            day_of_week,
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
        }
    }

    pub fn day_off(day_of_week: i32) -> Self {
        Self {
            day_of_week,
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Advisory view of one upcoming calendar day for a doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayProjection {
    pub date: NaiveDate,
    pub day_name: String,
    pub windows: Vec<TimeWindow>,
    pub booked_times: Vec<NaiveTime>,
    pub has_availability: bool,
}

// ==============================================================================
// PROFILE & CATALOG
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub specialization_id: Option<i64>,
    pub qualification: Option<String>,
    pub experience_years: Option<i64>,
    pub consultation_fee: Option<f64>,
}

// ==============================================================================
// PRACTICE VIEWS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorAppointmentQuery {
    pub status: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientSummary {
    pub patient: User,
    pub appointment_count: u64,
    pub last_visit: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientHistory {
    pub patient: User,
    pub appointments: Vec<Appointment>,
    pub treatments: Vec<TreatmentRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorStats {
    pub total_appointments: u64,
    pub booked_appointments: u64,
    pub completed_appointments: u64,
    pub cancelled_appointments: u64,
    pub total_patients: u64,
    pub treatment_records: u64,
    pub todays_appointments: u64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized access: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for DoctorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => DoctorError::NotFound,
            StoreError::UniqueViolation(msg) => DoctorError::Conflict(msg),
            other => DoctorError::Database(other.to_string()),
        }
    }
}

impl From<AppError> for DoctorError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::NotFound(_) => DoctorError::NotFound,
            AppError::ValidationError(msg) => DoctorError::ValidationError(msg),
            AppError::Authorization(msg) => DoctorError::Unauthorized(msg),
            AppError::Conflict(msg) => DoctorError::Conflict(msg),
            other => DoctorError::Database(other.to_string()),
        }
    }
}

impl From<DoctorError> for AppError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound | DoctorError::PatientNotFound => AppError::NotFound(e.to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::Unauthorized(msg) => AppError::Authorization(msg),
            DoctorError::Conflict(msg) => AppError::Conflict(msg),
            DoctorError::Database(msg) => AppError::Database(msg),
        }
    }
}
