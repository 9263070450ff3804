use std::sync::Arc;
use tracing::{info, instrument, warn};

use cache_cell::DirectoryCache;
use shared_database::RecordStore;
use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Identity, NewUser, Page, Paged, Role,
    SortOrder, User, UserChanges, UserFilter,
};
use shared_utils::validation::{optional, required, validate_email};

use crate::models::{AdminError, CreateUserRequest, SystemStats, UpdateUserRequest, UserSearchQuery};

/// Account management and clinic-wide views. Every operation except
/// `ensure_admin` requires an admin identity.
pub struct AdminService {
    store: Arc<dyn RecordStore>,
    cache: Arc<DirectoryCache>,
}

impl AdminService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<DirectoryCache>) -> Self {
        Self { store, cache }
    }

    #[instrument(skip(self, identity, request))]
    pub async fn create_user(&self, identity: &Identity, request: CreateUserRequest) -> Result<User, AdminError> {
        identity.require_role(Role::Admin)?;

        let name = required("name", request.name.as_deref())?.to_string();
        let email = validate_email(required("email", request.email.as_deref())?)?;
        let role = match required("role", request.role.as_deref())?.parse::<Role>() {
            Ok(role @ (Role::Doctor | Role::Patient)) => role,
            _ => {
                return Err(AdminError::ValidationError(
                    "Role must be doctor or patient".to_string(),
                ))
            }
        };

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AdminError::EmailAlreadyExists);
        }

        let mut new_user = NewUser::new(name, email, role);
        new_user.phone = optional(request.phone.as_deref());
        if role == Role::Doctor {
            new_user.specialization = optional(request.specialization.as_deref());
        }

        let user = self.store.insert_user(new_user).await?;
        if user.is_doctor() {
            self.cache.invalidate_doctors_list().await;
        }

        info!("Admin {} created {} {}", identity.user_id, user.role, user.id);
        Ok(user)
    }

    pub async fn update_user(
        &self,
        identity: &Identity,
        user_id: i64,
        request: UpdateUserRequest,
    ) -> Result<User, AdminError> {
        identity.require_role(Role::Admin)?;
        let user = self.load_user(user_id).await?;

        if user.is_admin() && user.id != identity.user_id {
            return Err(AdminError::Unauthorized(
                "Cannot update other admin accounts".to_string(),
            ));
        }

        let name = match request.name.as_deref() {
            Some(raw) => Some(required("name", Some(raw))?.to_string()),
            None => None,
        };
        let email = match request.email.as_deref() {
            Some(raw) => {
                let email = validate_email(raw)?;
                let owner = self.store.find_user_by_email(&email).await?;
                if owner.is_some_and(|other| other.id != user.id) {
                    return Err(AdminError::EmailAlreadyExists);
                }
                Some(email)
            }
            None => None,
        };

        let changes = UserChanges {
            name,
            email,
            phone: request.phone.map(|p| p.trim().to_string()),
            ..Default::default()
        };
        if changes.is_empty() {
            return Ok(user);
        }

        let updated = self.store.update_user(user_id, changes).await?;
        if updated.is_doctor() {
            self.cache.invalidate_doctors_list().await;
        }
        Ok(updated)
    }

    /// Removes a doctor or patient account. Past appointments and treatment
    /// records stay in place; a booked appointment blocks the deletion.
    #[instrument(skip(self, identity))]
    pub async fn delete_user(&self, identity: &Identity, user_id: i64) -> Result<(), AdminError> {
        identity.require_role(Role::Admin)?;
        let user = self.load_user(user_id).await?;

        if user.is_admin() {
            return Err(AdminError::Unauthorized("Cannot delete admin accounts".to_string()));
        }

        let as_doctor = AppointmentFilter::for_doctor(user_id).with_status(AppointmentStatus::Booked);
        let as_patient = AppointmentFilter::for_patient(user_id).with_status(AppointmentStatus::Booked);
        let active = self.store.count_appointments(as_doctor).await?
            + self.store.count_appointments(as_patient).await?;
        if active > 0 {
            warn!("Refusing to delete user {} with {} booked appointments", user_id, active);
            return Err(AdminError::ActiveAppointments);
        }

        self.store.delete_user(user_id).await?;

        if user.is_doctor() {
            self.cache.invalidate_doctors_list().await;
            self.cache.invalidate_doctor_availability(user_id).await;
        }

        info!("Admin {} deleted {} {}", identity.user_id, user.role, user_id);
        Ok(())
    }

    /// Doctors and patients matching the name/email fragment. Admin accounts
    /// are never listed.
    pub async fn search_users(
        &self,
        identity: &Identity,
        query: UserSearchQuery,
        page: Page,
    ) -> Result<Paged<User>, AdminError> {
        identity.require_role(Role::Admin)?;

        let role = match optional(query.role.as_deref()) {
            Some(raw) => Some(raw.parse::<Role>()?),
            None => None,
        };
        let filter = UserFilter {
            role,
            exclude_role: Some(Role::Admin),
            search: optional(query.q.as_deref()),
        };

        let total = self.store.count_users(filter.clone()).await?;
        let items = self.store.list_users(filter, Some(page)).await?;
        Ok(Paged::new(items, total, page))
    }

    /// Every appointment in the clinic, newest first.
    pub async fn list_appointments(
        &self,
        identity: &Identity,
        status: Option<AppointmentStatus>,
        page: Page,
    ) -> Result<Paged<Appointment>, AdminError> {
        identity.require_role(Role::Admin)?;

        let filter = AppointmentFilter {
            status,
            ..Default::default()
        };
        let total = self.store.count_appointments(filter.clone()).await?;
        let items = self
            .store
            .find_appointments(filter, SortOrder::Descending, Some(page))
            .await?;
        Ok(Paged::new(items, total, page))
    }

    pub async fn system_stats(&self, identity: &Identity) -> Result<SystemStats, AdminError> {
        identity.require_role(Role::Admin)?;

        let users_with = |role| UserFilter {
            role: Some(role),
            ..Default::default()
        };
        let appointments_with = |status| AppointmentFilter::default().with_status(status);

        Ok(SystemStats {
            total_doctors: self.store.count_users(users_with(Role::Doctor)).await?,
            total_patients: self.store.count_users(users_with(Role::Patient)).await?,
            total_appointments: self.store.count_appointments(AppointmentFilter::default()).await?,
            booked_appointments: self
                .store
                .count_appointments(appointments_with(AppointmentStatus::Booked))
                .await?,
            completed_appointments: self
                .store
                .count_appointments(appointments_with(AppointmentStatus::Completed))
                .await?,
            cancelled_appointments: self
                .store
                .count_appointments(appointments_with(AppointmentStatus::Cancelled))
                .await?,
        })
    }

    /// Creates the bootstrap admin account unless the email is already
    /// registered. Safe to call on every start.
    pub async fn ensure_admin(&self, name: &str, email: &str) -> Result<User, AdminError> {
        let email = validate_email(email)?;

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            if !existing.is_admin() {
                return Err(AdminError::ValidationError(format!(
                    "{} is registered to a non-admin account",
                    email
                )));
            }
            return Ok(existing);
        }

        let name = required("name", Some(name))?.to_string();
        let admin = self.store.insert_user(NewUser::new(name, email, Role::Admin)).await?;
        info!("Default admin account created: {}", admin.email);
        Ok(admin)
    }

    async fn load_user(&self, user_id: i64) -> Result<User, AdminError> {
        self.store.get_user(user_id).await?.ok_or(AdminError::UserNotFound)
    }
}
