use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use cache_cell::DirectoryCache;
use shared_database::{RecordStore, StoreError};
use shared_models::{Identity, NewSpecialization, Role, Specialization, User, UserChanges};
use shared_utils::validation::{optional, required};

use crate::models::{DoctorError, DoctorProfileUpdate};

/// Doctor roster, profiles and the specialization catalog.
pub struct DoctorService {
    store: Arc<dyn RecordStore>,
    cache: Arc<DirectoryCache>,
}

impl DoctorService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<DirectoryCache>) -> Self {
        Self { store, cache }
    }

    /// Cached roster, optionally narrowed by a case-insensitive name or email
    /// fragment.
    pub async fn list_doctors(&self, search: Option<&str>) -> Result<Vec<User>, DoctorError> {
        let doctors = self.cache.doctors_list().await?;

        let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(doctors);
        };
        let term = term.to_lowercase();
        Ok(doctors
            .into_iter()
            .filter(|d| d.name.to_lowercase().contains(&term) || d.email.to_lowercase().contains(&term))
            .collect())
    }

    pub async fn get_profile(&self, doctor_id: i64) -> Result<User, DoctorError> {
        match self.store.get_user(doctor_id).await? {
            Some(user) if user.is_doctor() => Ok(user),
            _ => Err(DoctorError::NotFound),
        }
    }

    /// Doctors edit their own profile; the roster cache is dropped afterwards.
    #[instrument(skip(self, identity, update))]
    pub async fn update_profile(
        &self,
        identity: &Identity,
        doctor_id: i64,
        update: DoctorProfileUpdate,
    ) -> Result<User, DoctorError> {
        if identity.role != Role::Doctor || identity.user_id != doctor_id {
            return Err(DoctorError::Unauthorized(
                "Doctors can only edit their own profile".to_string(),
            ));
        }
        self.get_profile(doctor_id).await?;

        let changes = self.profile_changes(update).await?;
        let updated = self.store.update_user(doctor_id, changes).await?;

        self.cache.invalidate_doctors_list().await;

        info!("Doctor {} profile updated", doctor_id);
        Ok(updated)
    }

    async fn profile_changes(&self, update: DoctorProfileUpdate) -> Result<UserChanges, DoctorError> {
        let name = match update.name.as_deref() {
            Some(raw) => Some(required("name", Some(raw))?.to_string()),
            None => None,
        };

        let experience_years = match update.experience_years {
            Some(years) if years < 0 => {
                return Err(DoctorError::ValidationError(
                    "Experience cannot be negative".to_string(),
                ))
            }
            Some(years) => Some(u32::try_from(years).map_err(|_| {
                DoctorError::ValidationError("Experience is out of range".to_string())
            })?),
            None => None,
        };

        if update.consultation_fee.is_some_and(|fee| fee < 0.0 || !fee.is_finite()) {
            return Err(DoctorError::ValidationError(
                "Consultation fee cannot be negative".to_string(),
            ));
        }

        let mut specialization = update.specialization.as_deref().and_then(|s| optional(Some(s)));
        if let Some(id) = update.specialization_id {
            let catalog = self.store.list_specializations().await?;
            let entry = catalog
                .into_iter()
                .find(|s| s.id == id)
                .ok_or_else(|| DoctorError::ValidationError(format!("Unknown specialization {}", id)))?;
            specialization.get_or_insert(entry.name);
        }

        Ok(UserChanges {
            name,
            phone: update.phone,
            specialization,
            specialization_id: update.specialization_id,
            qualification: update.qualification,
            experience_years,
            consultation_fee: update.consultation_fee,
            ..Default::default()
        })
    }

    pub async fn create_specialization(
        &self,
        identity: &Identity,
        name: &str,
        description: Option<&str>,
    ) -> Result<Specialization, DoctorError> {
        if !identity.is_admin() {
            return Err(DoctorError::Unauthorized("Admin access required".to_string()));
        }
        let name = required("name", Some(name))?;

        let created = self
            .store
            .insert_specialization(NewSpecialization {
                name: name.to_string(),
                description: optional(description),
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => {
                    DoctorError::Conflict(format!("Specialization {} already exists", name))
                }
                other => other.into(),
            })?;

        debug!("Created specialization {}", created.name);
        Ok(created)
    }

    pub async fn list_specializations(&self) -> Result<Vec<Specialization>, DoctorError> {
        Ok(self.store.list_specializations().await?)
    }

    /// Seeds the catalog from the distinct free-text specializations already
    /// on doctor profiles. Existing names are left alone.
    pub async fn derive_specializations_from_doctors(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Specialization>, DoctorError> {
        if !identity.is_admin() {
            return Err(DoctorError::Unauthorized("Admin access required".to_string()));
        }

        let existing: BTreeSet<String> = self
            .store
            .list_specializations()
            .await?
            .into_iter()
            .map(|s| s.name.to_lowercase())
            .collect();

        let mut seen = BTreeSet::new();
        let mut created = Vec::new();
        for doctor in self.cache.doctors_list().await? {
            let Some(name) = optional(doctor.specialization.as_deref()) else {
                continue;
            };
            let key = name.to_lowercase();
            if existing.contains(&key) || !seen.insert(key) {
                continue;
            }

            match self
                .store
                .insert_specialization(NewSpecialization { name, description: None })
                .await
            {
                Ok(spec) => created.push(spec),
                Err(StoreError::UniqueViolation(msg)) => warn!("Specialization created concurrently: {}", msg),
                Err(e) => return Err(e.into()),
            }
        }

        info!("Derived {} specializations from doctor profiles", created.len());
        Ok(created)
    }

    /// Doctors linked to the specialization, falling back to a
    /// case-insensitive match on the free-text field for unlinked profiles.
    pub async fn doctors_for_specialization(&self, specialization_id: i64) -> Result<Vec<User>, DoctorError> {
        let catalog = self.store.list_specializations().await?;
        let spec = catalog
            .into_iter()
            .find(|s| s.id == specialization_id)
            .ok_or_else(|| DoctorError::ValidationError(format!("Unknown specialization {}", specialization_id)))?;
        let needle = spec.name.to_lowercase();

        Ok(self
            .cache
            .doctors_list()
            .await?
            .into_iter()
            .filter(|d| match d.specialization_id {
                Some(id) => id == specialization_id,
                None => d
                    .specialization
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&needle)),
            })
            .collect())
    }
}
