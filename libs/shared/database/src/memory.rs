use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Availability, AvailabilityWindow,
    NewAppointment, NewSpecialization, NewTreatment, NewUser, Page, SortOrder, Specialization,
    TreatmentFilter, TreatmentRecord, User, UserChanges, UserFilter,
};

use crate::error::StoreError;
use crate::store::RecordStore;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    availability: BTreeMap<i64, Availability>,
    appointments: BTreeMap<i64, Appointment>,
    treatments: BTreeMap<i64, TreatmentRecord>,
    specializations: BTreeMap<i64, Specialization>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        let email = email.to_lowercase();
        self.users
            .values()
            .any(|u| u.email.to_lowercase() == email && Some(u.id) != except)
    }

    fn slot_taken(&self, appointment: &Appointment) -> bool {
        appointment.is_booked()
            && self.appointments.values().any(|existing| {
                existing.id != appointment.id
                    && existing.occupies(appointment.doctor_id, appointment.date, appointment.time)
            })
    }
}

/// Process-local store used by tests and single-node development runs.
/// Enforces the same uniqueness rules as the SQL schema.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(items: Vec<T>, page: Option<Page>) -> Vec<T> {
    match page {
        Some(page) => items.into_iter().skip(page.offset()).take(page.limit()).collect(),
        None => items,
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::UniqueViolation(format!("email {} already registered", user.email)));
        }

        let id = tables.next_id();
        let record = User {
            id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            specialization: user.specialization,
            specialization_id: user.specialization_id,
            qualification: user.qualification,
            experience_years: user.experience_years,
            consultation_fee: user.consultation_fee,
            created_at: Utc::now(),
        };
        tables.users.insert(id, record.clone());
        debug!("Inserted user {} ({})", id, record.role);
        Ok(record)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::UniqueViolation(format!("email {} already registered", email)));
            }
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
        changes.apply_to(user);
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("user {}", id)));
        }
        tables.availability.retain(|_, a| a.doctor_id != id);
        Ok(())
    }

    async fn list_users(&self, filter: UserFilter, page: Option<Page>) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().filter(|u| filter.matches(u)).cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paginate(users, page))
    }

    async fn count_users(&self, filter: UserFilter) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().filter(|u| filter.matches(u)).count() as u64)
    }

    async fn replace_availability(
        &self,
        doctor_id: i64,
        windows: Vec<AvailabilityWindow>,
    ) -> Result<Vec<Availability>, StoreError> {
        let mut tables = self.tables.write().await;
        tables.availability.retain(|_, a| a.doctor_id != doctor_id);

        let now = Utc::now();
        let mut stored = Vec::with_capacity(windows.len());
        for window in windows {
            let id = tables.next_id();
            let row = Availability {
                id,
                doctor_id,
                day_of_week: window.day_of_week,
                start_time: window.start_time,
                end_time: window.end_time,
                created_at: now,
            };
            tables.availability.insert(id, row.clone());
            stored.push(row);
        }
        stored.sort_by_key(|a| a.day_of_week);
        Ok(stored)
    }

    async fn list_availability(&self, doctor_id: i64) -> Result<Vec<Availability>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Availability> = tables
            .availability
            .values()
            .filter(|a| a.doctor_id == doctor_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.day_of_week);
        Ok(rows)
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut record = Appointment {
            id: 0,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            date: appointment.date,
            time: appointment.time,
            status: AppointmentStatus::Booked,
            notes: appointment.notes,
            diagnosis: None,
            prescription: None,
            created_at: now,
            updated_at: now,
        };
        if tables.slot_taken(&record) {
            return Err(StoreError::UniqueViolation(format!(
                "doctor {} already booked at {} {}",
                record.doctor_id, record.date, record.time
            )));
        }

        record.id = tables.next_id();
        tables.appointments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_appointment(&self, id: i64) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.appointments.get(&appointment.id) {
            None => return Err(StoreError::NotFound(format!("appointment {}", appointment.id))),
            Some(current) if current.status != expected => {
                return Err(StoreError::StaleWrite(format!(
                    "appointment {} is {}, expected {}",
                    appointment.id, current.status, expected
                )))
            }
            Some(_) => {}
        }
        if tables.slot_taken(&appointment) {
            return Err(StoreError::UniqueViolation(format!(
                "doctor {} already booked at {} {}",
                appointment.doctor_id, appointment.date, appointment.time
            )));
        }

        let stored = tables
            .appointments
            .get_mut(&appointment.id)
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment.id)))?;
        stored.date = appointment.date;
        stored.time = appointment.time;
        stored.status = appointment.status;
        stored.notes = appointment.notes;
        stored.diagnosis = appointment.diagnosis;
        stored.prescription = appointment.prescription;
        stored.updated_at = appointment.updated_at;
        Ok(stored.clone())
    }

    async fn find_appointments(
        &self,
        filter: AppointmentFilter,
        order: SortOrder,
        page: Option<Page>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.date, a.time, a.id).cmp(&(b.date, b.time, b.id)));
        if order == SortOrder::Descending {
            rows.reverse();
        }
        Ok(paginate(rows, page))
    }

    async fn count_appointments(&self, filter: AppointmentFilter) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.appointments.values().filter(|a| filter.matches(a)).count() as u64)
    }

    async fn record_treatment(
        &self,
        treatment: NewTreatment,
        completed: Option<Appointment>,
    ) -> Result<TreatmentRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.appointments.contains_key(&treatment.appointment_id) {
            return Err(StoreError::NotFound(format!("appointment {}", treatment.appointment_id)));
        }

        if let Some(appointment) = completed {
            let stored = tables
                .appointments
                .get_mut(&appointment.id)
                .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment.id)))?;
            if stored.status != AppointmentStatus::Booked {
                return Err(StoreError::StaleWrite(format!(
                    "appointment {} is {}, expected booked",
                    stored.id, stored.status
                )));
            }
            stored.status = appointment.status;
            stored.diagnosis = appointment.diagnosis;
            stored.prescription = appointment.prescription;
            stored.updated_at = appointment.updated_at;
        }

        let id = tables.next_id();
        let record = TreatmentRecord {
            id,
            appointment_id: treatment.appointment_id,
            doctor_id: treatment.doctor_id,
            patient_id: treatment.patient_id,
            summary: treatment.summary,
            diagnosis: treatment.diagnosis,
            prescription: treatment.prescription,
            treatment_notes: treatment.treatment_notes,
            follow_up_date: treatment.follow_up_date,
            created_at: Utc::now(),
        };
        tables.treatments.insert(id, record.clone());
        Ok(record)
    }

    async fn find_treatments(
        &self,
        filter: TreatmentFilter,
        page: Option<Page>,
    ) -> Result<Vec<TreatmentRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<TreatmentRecord> = tables
            .treatments
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(paginate(rows, page))
    }

    async fn count_treatments(&self, filter: TreatmentFilter) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.treatments.values().filter(|t| filter.matches(t)).count() as u64)
    }

    async fn insert_specialization(&self, specialization: NewSpecialization) -> Result<Specialization, StoreError> {
        let mut tables = self.tables.write().await;
        let name = specialization.name.trim().to_string();
        if tables
            .specializations
            .values()
            .any(|s| s.name.eq_ignore_ascii_case(&name))
        {
            return Err(StoreError::UniqueViolation(format!("specialization {} already exists", name)));
        }

        let id = tables.next_id();
        let record = Specialization {
            id,
            name,
            description: specialization.description,
            created_at: Utc::now(),
        };
        tables.specializations.insert(id, record.clone());
        Ok(record)
    }

    async fn list_specializations(&self) -> Result<Vec<Specialization>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Specialization> = tables.specializations.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}
