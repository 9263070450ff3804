use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, error, warn};

use shared_database::RecordStore;
use shared_models::{AppointmentFilter, AppointmentStatus};

/// Decides whether a slot is already taken. Reads the record store directly;
/// cached data is never trusted for admission.
pub struct ConflictDetectionService {
    store: Arc<dyn RecordStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// True when another `booked` appointment holds exactly this doctor, date
    /// and time. A failed lookup counts as a conflict.
    pub async fn is_double_booked(
        &self,
        doctor_id: i64,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<i64>,
    ) -> bool {
        let filter = AppointmentFilter {
            doctor_id: Some(doctor_id),
            status: Some(AppointmentStatus::Booked),
            date: Some(date),
            time: Some(time),
            exclude_id: exclude_appointment_id,
            ..Default::default()
        };

        match self.store.count_appointments(filter).await {
            Ok(0) => {
                debug!("Slot {} {} free for doctor {}", date, time, doctor_id);
                false
            }
            Ok(existing) => {
                warn!(
                    "Conflict detected for doctor {} at {} {} ({} booked)",
                    doctor_id, date, time, existing
                );
                true
            }
            Err(e) => {
                error!(
                    "Conflict check failed for doctor {} at {} {}, refusing slot: {}",
                    doctor_id, date, time, e
                );
                true
            }
        }
    }
}
