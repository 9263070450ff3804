use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use shared_database::RecordStore;
use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Identity, Page, Paged, Role, SortOrder,
    TreatmentFilter,
};
use shared_utils::validation::parse_date;

use crate::models::{DoctorAppointmentQuery, DoctorError, DoctorStats, PatientHistory, PatientSummary};

/// Read-only views a doctor has over their own practice.
pub struct PracticeService {
    store: Arc<dyn RecordStore>,
}

impl PracticeService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn doctor_id(identity: &Identity) -> Result<i64, DoctorError> {
        if identity.role == Role::Doctor {
            Ok(identity.user_id)
        } else {
            Err(DoctorError::Unauthorized("Doctor access required".to_string()))
        }
    }

    /// The doctor's appointments, earliest first.
    pub async fn appointments(
        &self,
        identity: &Identity,
        query: DoctorAppointmentQuery,
        page: Page,
    ) -> Result<Paged<Appointment>, DoctorError> {
        let doctor_id = Self::doctor_id(identity)?;

        let mut filter = AppointmentFilter::for_doctor(doctor_id);
        // unknown status values are ignored rather than rejected
        if let Some(status) = query.status.as_deref().and_then(|s| s.parse::<AppointmentStatus>().ok()) {
            filter = filter.with_status(status);
        }
        if let Some(date) = query.date.as_deref().filter(|d| !d.trim().is_empty()) {
            filter = filter.on(parse_date("date", date)?);
        }

        let total = self.store.count_appointments(filter.clone()).await?;
        let items = self
            .store
            .find_appointments(filter, SortOrder::Ascending, Some(page))
            .await?;
        Ok(Paged::new(items, total, page))
    }

    /// Every patient with at least one appointment with this doctor.
    pub async fn patients(&self, identity: &Identity) -> Result<Vec<PatientSummary>, DoctorError> {
        let doctor_id = Self::doctor_id(identity)?;
        let appointments = self
            .store
            .find_appointments(AppointmentFilter::for_doctor(doctor_id), SortOrder::Ascending, None)
            .await?;

        let mut per_patient: BTreeMap<i64, (u64, Option<NaiveDate>)> = BTreeMap::new();
        for appointment in &appointments {
            let entry = per_patient.entry(appointment.patient_id).or_insert((0, None));
            entry.0 += 1;
            if appointment.status == AppointmentStatus::Completed {
                entry.1 = entry.1.max(Some(appointment.date));
            }
        }

        let mut summaries = Vec::with_capacity(per_patient.len());
        for (patient_id, (appointment_count, last_visit)) in per_patient {
            // history can outlive a deleted account
            let Some(patient) = self.store.get_user(patient_id).await? else {
                continue;
            };
            summaries.push(PatientSummary {
                patient,
                appointment_count,
                last_visit,
            });
        }

        debug!("Doctor {} has {} patients", doctor_id, summaries.len());
        Ok(summaries)
    }

    /// Full history of one patient with this doctor. Only available once the
    /// doctor has had at least one appointment with the patient.
    pub async fn patient_history(&self, identity: &Identity, patient_id: i64) -> Result<PatientHistory, DoctorError> {
        let doctor_id = Self::doctor_id(identity)?;

        let filter = AppointmentFilter {
            patient_id: Some(patient_id),
            ..AppointmentFilter::for_doctor(doctor_id)
        };
        if self.store.count_appointments(filter.clone()).await? == 0 {
            return Err(DoctorError::Unauthorized(
                "You have not treated this patient".to_string(),
            ));
        }

        let patient = self
            .store
            .get_user(patient_id)
            .await?
            .ok_or(DoctorError::PatientNotFound)?;

        let appointments = self
            .store
            .find_appointments(filter, SortOrder::Descending, None)
            .await?;
        let treatments = self
            .store
            .find_treatments(
                TreatmentFilter {
                    patient_id: Some(patient_id),
                    doctor_id: Some(doctor_id),
                    ..Default::default()
                },
                None,
            )
            .await?;

        Ok(PatientHistory {
            patient,
            appointments,
            treatments,
        })
    }

    pub async fn stats(&self, identity: &Identity, today: NaiveDate) -> Result<DoctorStats, DoctorError> {
        let doctor_id = Self::doctor_id(identity)?;
        let appointments = self
            .store
            .find_appointments(AppointmentFilter::for_doctor(doctor_id), SortOrder::Ascending, None)
            .await?;
        let count_status = |status: AppointmentStatus| {
            appointments.iter().filter(|a| a.status == status).count() as u64
        };
        let mut patients: Vec<i64> = appointments.iter().map(|a| a.patient_id).collect();
        patients.sort_unstable();
        patients.dedup();

        Ok(DoctorStats {
            total_appointments: appointments.len() as u64,
            booked_appointments: count_status(AppointmentStatus::Booked),
            completed_appointments: count_status(AppointmentStatus::Completed),
            cancelled_appointments: count_status(AppointmentStatus::Cancelled),
            total_patients: patients.len() as u64,
            treatment_records: self
                .store
                .count_treatments(TreatmentFilter {
                    doctor_id: Some(doctor_id),
                    ..Default::default()
                })
                .await?,
            todays_appointments: appointments.iter().filter(|a| a.date == today).count() as u64,
        })
    }
}
