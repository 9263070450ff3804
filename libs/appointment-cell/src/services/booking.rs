// libs/appointment-cell/src/services/booking.rs
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use shared_database::RecordStore;
use shared_models::{Appointment, AppointmentStatus, Identity, NewAppointment, NewTreatment, Role, TreatmentRecord};
use shared_utils::validation::{optional, parse_date, parse_time, required};
use shared_utils::Clock;

use crate::models::{
    AppointmentError, BookAppointmentRequest, RescheduleAppointmentRequest, TreatmentRequest, Transition,
    UpdateStatusRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::{SlotKey, SlotLockRegistry};

pub struct AppointmentBookingService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    slot_locks: Arc<SlotLockRegistry>,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_locks(store, clock, Arc::new(SlotLockRegistry::new()))
    }

    /// Services that write the same store from one process should share a
    /// registry.
    pub fn with_locks(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, slot_locks: Arc<SlotLockRegistry>) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            store,
            clock,
            slot_locks,
        }
    }

    // ==========================================================================
    // PATIENT OPERATIONS
    // ==========================================================================

    #[instrument(skip(self, identity, request), fields(patient_id = identity.user_id))]
    pub async fn book_appointment(
        &self,
        identity: &Identity,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        identity.require_role(Role::Patient)?;

        let doctor_id = request
            .doctor_id
            .ok_or_else(|| AppointmentError::ValidationError("doctor_id is required".to_string()))?;
        let raw_date = required("date", request.date.as_deref())?;
        let raw_time = required("time", request.time.as_deref())?;

        match self.store.get_user(doctor_id).await? {
            Some(user) if user.is_doctor() => {}
            _ => return Err(AppointmentError::DoctorNotFound),
        }

        let (date, time) = self.parse_slot(raw_date, raw_time)?;

        let _slot = self.slot_locks.acquire(SlotKey::new(doctor_id, date, time)).await;
        if self.conflict_service.is_double_booked(doctor_id, date, time, None).await {
            return Err(AppointmentError::ConflictDetected);
        }

        let appointment = self
            .store
            .insert_appointment(NewAppointment {
                patient_id: identity.user_id,
                doctor_id,
                date,
                time,
                notes: optional(request.notes.as_deref()),
            })
            .await?;

        info!(
            "Appointment {} booked with doctor {} on {} at {}",
            appointment.id, doctor_id, date, time
        );
        Ok(appointment)
    }

    #[instrument(skip(self, identity, request))]
    pub async fn reschedule_appointment(
        &self,
        identity: &Identity,
        appointment_id: i64,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        identity.require_role(Role::Patient)?;
        let current = self.load_for_patient(identity, appointment_id).await?;
        self.lifecycle_service
            .validate_status_transition(Transition::Reschedule, current.status)?;

        let (Some(raw_date), Some(raw_time)) = (
            optional(request.date.as_deref()),
            optional(request.time.as_deref()),
        ) else {
            return Err(AppointmentError::ValidationError(
                "Date and time are required".to_string(),
            ));
        };
        let (date, time) = self.parse_slot(&raw_date, &raw_time)?;

        let _slot = self
            .slot_locks
            .acquire(SlotKey::new(current.doctor_id, date, time))
            .await;

        // re-read under the lock; a concurrent cancel may have landed
        let mut appointment = self.load_for_patient(identity, appointment_id).await?;
        let status = self
            .lifecycle_service
            .validate_status_transition(Transition::Reschedule, appointment.status)?;

        if self
            .conflict_service
            .is_double_booked(appointment.doctor_id, date, time, Some(appointment.id))
            .await
        {
            return Err(AppointmentError::ConflictDetected);
        }

        appointment.date = date;
        appointment.time = time;
        appointment.status = status;
        if let Some(notes) = request.notes {
            appointment.notes = optional(Some(&notes));
        }
        appointment.updated_at = self.clock.now();

        // a cancel or completion landing after the re-read makes this a stale write
        let updated = self
            .store
            .update_appointment(appointment, AppointmentStatus::Booked)
            .await?;
        info!("Appointment {} rescheduled to {} {}", updated.id, date, time);
        Ok(updated)
    }

    /// Cancelling an already cancelled appointment is rejected. A completed
    /// appointment can still be cancelled by its patient.
    #[instrument(skip(self, identity))]
    pub async fn cancel_appointment(
        &self,
        identity: &Identity,
        appointment_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        identity.require_role(Role::Patient)?;
        let mut appointment = self.load_for_patient(identity, appointment_id).await?;
        let observed = appointment.status;

        appointment.status = self
            .lifecycle_service
            .validate_status_transition(Transition::PatientCancel, observed)?;
        appointment.updated_at = self.clock.now();

        let updated = self.store.update_appointment(appointment, observed).await?;
        info!("Appointment {} cancelled by patient", updated.id);
        Ok(updated)
    }

    // ==========================================================================
    // DOCTOR OPERATIONS
    // ==========================================================================

    #[instrument(skip(self, identity, request), fields(status = %request.status))]
    pub async fn update_status(
        &self,
        identity: &Identity,
        appointment_id: i64,
        request: UpdateStatusRequest,
    ) -> Result<Appointment, AppointmentError> {
        identity.require_role(Role::Doctor)?;
        let mut appointment = self.load_for_doctor(identity, appointment_id).await?;
        let observed = appointment.status;

        let transition = self.lifecycle_service.doctor_transition_for(&request.status)?;
        appointment.status = self
            .lifecycle_service
            .validate_status_transition(transition, observed)?;

        if let Some(notes) = request.notes {
            appointment.notes = optional(Some(&notes));
        }
        if transition == Transition::DoctorComplete {
            appointment.diagnosis = optional(request.diagnosis.as_deref());
            appointment.prescription = optional(request.prescription.as_deref());
        }
        appointment.updated_at = self.clock.now();

        let updated = self.store.update_appointment(appointment, observed).await?;
        info!("Appointment {} marked as {}", updated.id, updated.status);
        Ok(updated)
    }

    /// Stores a treatment note and completes the appointment if it is still
    /// booked, in one store call. A status change that lands between the
    /// read and the write fails the call without storing the note.
    #[instrument(skip(self, identity, request))]
    pub async fn record_treatment(
        &self,
        identity: &Identity,
        request: TreatmentRequest,
    ) -> Result<TreatmentRecord, AppointmentError> {
        identity.require_role(Role::Doctor)?;

        let appointment_id = request
            .appointment_id
            .ok_or_else(|| AppointmentError::ValidationError("appointment_id is required".to_string()))?;
        let summary = required("summary", request.summary.as_deref())?.to_string();
        let follow_up_date = match optional(request.follow_up_date.as_deref()) {
            Some(raw) => Some(parse_date("follow_up_date", &raw)?),
            None => None,
        };

        let appointment = self.load_for_doctor(identity, appointment_id).await?;
        let diagnosis = optional(request.diagnosis.as_deref());
        let prescription = optional(request.prescription.as_deref());

        let completed = if appointment.status == AppointmentStatus::Booked {
            let mut completed = appointment.clone();
            completed.status = self
                .lifecycle_service
                .validate_status_transition(Transition::DoctorComplete, appointment.status)?;
            completed.diagnosis = diagnosis.clone();
            completed.prescription = prescription.clone();
            completed.updated_at = self.clock.now();
            Some(completed)
        } else {
            debug!("Appointment {} already {}, recording treatment only", appointment.id, appointment.status);
            None
        };

        let record = self
            .store
            .record_treatment(
                NewTreatment {
                    appointment_id,
                    doctor_id: identity.user_id,
                    patient_id: appointment.patient_id,
                    summary,
                    diagnosis,
                    prescription,
                    treatment_notes: optional(request.treatment_notes.as_deref()),
                    follow_up_date,
                },
                completed,
            )
            .await?;

        info!("Treatment {} recorded for appointment {}", record.id, appointment_id);
        Ok(record)
    }

    // ==========================================================================
    // SHARED
    // ==========================================================================

    pub async fn get_appointment(&self, identity: &Identity, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;

        let visible = match identity.role {
            Role::Admin => true,
            Role::Doctor => appointment.doctor_id == identity.user_id,
            Role::Patient => appointment.patient_id == identity.user_id,
        };
        if !visible {
            warn!("User {} denied access to appointment {}", identity.user_id, appointment_id);
            return Err(AppointmentError::Unauthorized("not your appointment".to_string()));
        }
        Ok(appointment)
    }

    fn parse_slot(&self, raw_date: &str, raw_time: &str) -> Result<(NaiveDate, NaiveTime), AppointmentError> {
        let date = parse_date("date", raw_date)?;
        let time = parse_time("time", raw_time)?;

        if date <= self.clock.today() {
            return Err(AppointmentError::ValidationError(
                "Appointment date must be in the future".to_string(),
            ));
        }
        Ok((date, time))
    }

    async fn load(&self, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    async fn load_for_patient(&self, identity: &Identity, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if appointment.patient_id != identity.user_id {
            return Err(AppointmentError::Unauthorized("not your appointment".to_string()));
        }
        Ok(appointment)
    }

    async fn load_for_doctor(&self, identity: &Identity, appointment_id: i64) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if appointment.doctor_id != identity.user_id {
            return Err(AppointmentError::Unauthorized(
                "appointment is assigned to another doctor".to_string(),
            ));
        }
        Ok(appointment)
    }
}
