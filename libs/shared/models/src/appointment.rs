use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "booked" => Ok(AppointmentStatus::Booked),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(AppError::ValidationError(format!("Invalid status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub prescription: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_booked(&self) -> bool {
        self.status == AppointmentStatus::Booked
    }

    pub fn occupies(&self, doctor_id: i64, date: NaiveDate, time: NaiveTime) -> bool {
        self.is_booked() && self.doctor_id == doctor_id && self.date == date && self.time == time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Conjunctive filter over appointments. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub exclude_id: Option<i64>,
}

impl AppointmentFilter {
    pub fn for_patient(patient_id: i64) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Default::default()
        }
    }

    pub fn for_doctor(doctor_id: i64) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: AppointmentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.date.map_or(true, |d| appointment.date == d)
            && self.time.map_or(true, |t| appointment.time == t)
            && self.date_from.map_or(true, |d| appointment.date >= d)
            && self.date_to.map_or(true, |d| appointment.date <= d)
            && self.exclude_id.map_or(true, |id| appointment.id != id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreatmentRecord {
    pub id: i64,
    pub appointment_id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub summary: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub prescription: Option<String>,
    #[serde(default)]
    pub treatment_notes: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTreatment {
    pub appointment_id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub summary: String,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub treatment_notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreatmentFilter {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl TreatmentFilter {
    pub fn matches(&self, record: &TreatmentRecord) -> bool {
        self.patient_id.map_or(true, |id| record.patient_id == id)
            && self.doctor_id.map_or(true, |id| record.doctor_id == id)
            && self.created_from.map_or(true, |from| record.created_at >= from)
            && self.created_before.map_or(true, |before| record.created_at < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(status: AppointmentStatus) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: 1,
            patient_id: 2,
            doctor_id: 7,
            date: NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date"),
            time: NaiveTime::from_hms_opt(10, 0, 0).expect("valid time"),
            status,
            notes: None,
            diagnosis: None,
            prescription: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_booked_appointments_occupy_a_slot() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date");
        let time = NaiveTime::from_hms_opt(10, 0, 0).expect("valid time");

        assert!(appointment(AppointmentStatus::Booked).occupies(7, date, time));
        assert!(!appointment(AppointmentStatus::Cancelled).occupies(7, date, time));
        assert!(!appointment(AppointmentStatus::Booked).occupies(8, date, time));
    }

    #[test]
    fn filter_excludes_given_id() {
        let filter = AppointmentFilter {
            exclude_id: Some(1),
            ..AppointmentFilter::for_doctor(7)
        };
        assert!(!filter.matches(&appointment(AppointmentStatus::Booked)));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&AppointmentStatus::Cancelled).expect("Failed to serialize");
        assert_eq!(json, "\"cancelled\"");
    }
}
