use async_trait::async_trait;

use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Availability, AvailabilityWindow,
    NewAppointment, NewSpecialization, NewTreatment, NewUser, Page, SortOrder, Specialization,
    TreatmentFilter, TreatmentRecord, User, UserChanges, UserFilter,
};

use crate::error::StoreError;

/// Durable storage for users, availability, appointments, treatment records
/// and specializations.
///
/// Implementations must enforce that at most one `booked` appointment exists
/// per (doctor, date, time) and report a second one as
/// [`StoreError::UniqueViolation`]. Multi-row writes (`replace_availability`,
/// `record_treatment`) are all-or-nothing.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User, StoreError>;

    /// Removes the user and their availability windows. Appointment and
    /// treatment history referencing the user is retained.
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;

    /// Users ordered by name.
    async fn list_users(&self, filter: UserFilter, page: Option<Page>) -> Result<Vec<User>, StoreError>;

    async fn count_users(&self, filter: UserFilter) -> Result<u64, StoreError>;

    /// Atomically replaces every window of the doctor with `windows`.
    async fn replace_availability(
        &self,
        doctor_id: i64,
        windows: Vec<AvailabilityWindow>,
    ) -> Result<Vec<Availability>, StoreError>;

    /// Windows ordered by day of week.
    async fn list_availability(&self, doctor_id: i64) -> Result<Vec<Availability>, StoreError>;

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;

    async fn get_appointment(&self, id: i64) -> Result<Option<Appointment>, StoreError>;

    /// Persists every mutable column of `appointment`, provided the stored
    /// row still has status `expected`. Otherwise nothing is written and
    /// [`StoreError::StaleWrite`] is returned.
    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected: AppointmentStatus,
    ) -> Result<Appointment, StoreError>;

    /// Appointments ordered by (date, time) in `order`.
    async fn find_appointments(
        &self,
        filter: AppointmentFilter,
        order: SortOrder,
        page: Option<Page>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn count_appointments(&self, filter: AppointmentFilter) -> Result<u64, StoreError>;

    /// Inserts the treatment record and, when given, persists the completed
    /// appointment in the same unit of work. The completion only applies to
    /// a row that is still `booked`; otherwise the whole call fails with
    /// [`StoreError::StaleWrite`].
    async fn record_treatment(
        &self,
        treatment: NewTreatment,
        completed: Option<Appointment>,
    ) -> Result<TreatmentRecord, StoreError>;

    /// Treatment records ordered newest first.
    async fn find_treatments(
        &self,
        filter: TreatmentFilter,
        page: Option<Page>,
    ) -> Result<Vec<TreatmentRecord>, StoreError>;

    async fn count_treatments(&self, filter: TreatmentFilter) -> Result<u64, StoreError>;

    async fn insert_specialization(&self, specialization: NewSpecialization) -> Result<Specialization, StoreError>;

    /// Specializations ordered by name.
    async fn list_specializations(&self) -> Result<Vec<Specialization>, StoreError>;
}
