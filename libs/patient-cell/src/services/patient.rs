use std::sync::Arc;
use tracing::{debug, info, instrument};

use job_queue_cell::{JobHandle, JobProducerService};
use shared_database::RecordStore;
use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Identity, NewUser, Page, Paged, Role,
    SortOrder, TreatmentFilter, TreatmentRecord, User, UserChanges,
};
use shared_utils::validation::{optional, required, validate_email};
use shared_utils::Clock;

use crate::models::{PatientError, PatientProfileUpdate, PatientRegistration, UPCOMING_LIMIT};

pub struct PatientService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    producer: Arc<JobProducerService>,
}

impl PatientService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        producer: Arc<JobProducerService>,
    ) -> Self {
        Self { store, clock, producer }
    }

    /// Open self-registration. The account is always a patient account.
    #[instrument(skip(self, registration))]
    pub async fn register_patient(&self, registration: PatientRegistration) -> Result<User, PatientError> {
        let name = required("name", registration.name.as_deref())?.to_string();
        let email = validate_email(required("email", registration.email.as_deref())?)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(PatientError::EmailAlreadyExists);
        }

        let user = self
            .store
            .insert_user(NewUser {
                phone: optional(registration.phone.as_deref()),
                ..NewUser::new(name, email, Role::Patient)
            })
            .await?;

        info!("Registered patient {}", user.id);
        Ok(user)
    }

    pub async fn get_profile(&self, identity: &Identity) -> Result<User, PatientError> {
        let patient_id = Self::patient_id(identity)?;
        self.store.get_user(patient_id).await?.ok_or(PatientError::NotFound)
    }

    pub async fn update_profile(
        &self,
        identity: &Identity,
        update: PatientProfileUpdate,
    ) -> Result<User, PatientError> {
        let current = self.get_profile(identity).await?;

        let name = match update.name.as_deref() {
            Some(raw) => Some(required("name", Some(raw))?.to_string()),
            None => None,
        };

        let email = match update.email.as_deref() {
            Some(raw) => {
                let email = validate_email(raw)?;
                if !email.eq_ignore_ascii_case(&current.email) {
                    if let Some(other) = self.store.find_user_by_email(&email).await? {
                        if other.id != current.id {
                            return Err(PatientError::EmailAlreadyExists);
                        }
                    }
                }
                Some(email)
            }
            None => None,
        };

        let changes = UserChanges {
            name,
            email,
            phone: update.phone.map(|p| p.trim().to_string()),
            ..Default::default()
        };
        if changes.is_empty() {
            return Ok(current);
        }

        let updated = self.store.update_user(current.id, changes).await?;
        debug!("Patient {} profile updated", updated.id);
        Ok(updated)
    }

    /// Own appointments, newest first.
    pub async fn appointment_history(
        &self,
        identity: &Identity,
        status: Option<AppointmentStatus>,
        page: Page,
    ) -> Result<Paged<Appointment>, PatientError> {
        let patient_id = Self::patient_id(identity)?;
        let filter = AppointmentFilter {
            status,
            ..AppointmentFilter::for_patient(patient_id)
        };

        let total = self.store.count_appointments(filter.clone()).await?;
        let items = self
            .store
            .find_appointments(filter, SortOrder::Descending, Some(page))
            .await?;
        Ok(Paged::new(items, total, page))
    }

    pub async fn treatment_history(
        &self,
        identity: &Identity,
        page: Page,
    ) -> Result<Paged<TreatmentRecord>, PatientError> {
        let patient_id = Self::patient_id(identity)?;
        let filter = TreatmentFilter {
            patient_id: Some(patient_id),
            ..Default::default()
        };

        let total = self.store.count_treatments(filter.clone()).await?;
        let items = self.store.find_treatments(filter, Some(page)).await?;
        Ok(Paged::new(items, total, page))
    }

    /// Next booked appointments from today on, soonest first.
    pub async fn upcoming_appointments(&self, identity: &Identity) -> Result<Vec<Appointment>, PatientError> {
        let patient_id = Self::patient_id(identity)?;
        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Booked),
            date_from: Some(self.clock.today()),
            ..AppointmentFilter::for_patient(patient_id)
        };

        Ok(self
            .store
            .find_appointments(filter, SortOrder::Ascending, Some(Page::first(UPCOMING_LIMIT)))
            .await?)
    }

    /// Queues a CSV export of the caller's history; the file is announced by
    /// email when ready.
    pub async fn request_export(&self, identity: &Identity) -> Result<JobHandle, PatientError> {
        Ok(self.producer.enqueue_export(identity).await?)
    }

    fn patient_id(identity: &Identity) -> Result<i64, PatientError> {
        identity.require_role(Role::Patient)?;
        Ok(identity.user_id)
    }
}
