use assert_matches::assert_matches;
use async_trait::async_trait;
use std::sync::Arc;

use cache_cell::{CacheBackend, CacheError, DirectoryCache, InMemoryCache};
use doctor_cell::{DoctorError, DoctorProfileUpdate, DoctorService};
use shared_database::RecordStore;
use shared_utils::test_utils::{TestClinic, TestUser};

struct DownCache;

#[async_trait]
impl CacheBackend for DownCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("timeout".to_string()))
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("timeout".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("timeout".to_string()))
    }
}

fn service_with(clinic: &TestClinic, backend: Arc<dyn CacheBackend>) -> DoctorService {
    let store: Arc<dyn RecordStore> = clinic.store.clone();
    DoctorService::new(store.clone(), Arc::new(DirectoryCache::new(backend, store)))
}

fn service(clinic: &TestClinic) -> DoctorService {
    service_with(clinic, Arc::new(InMemoryCache::new()))
}

#[tokio::test]
async fn test_list_doctors_excludes_other_roles_and_filters() {
    let clinic = TestClinic::new().await;
    TestUser::doctor("Shepherd", "shepherd@hospital.com")
        .with_specialization("Neurology")
        .create(clinic.store.as_ref())
        .await;
    let service = service(&clinic);

    let all = service.list_doctors(None).await.expect("Failed to list doctors");
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|d| d.is_doctor()));

    let filtered = service.list_doctors(Some("SHEP")).await.expect("Failed to search doctors");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].name, "Shepherd");
}

#[tokio::test]
async fn test_profile_update_is_visible_in_roster() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);

    let before = service.list_doctors(None).await.expect("Failed to list doctors");
    assert_eq!(before[0].consultation_fee, 0.0);

    service
        .update_profile(
            &clinic.doctor_identity(),
            clinic.doctor.id,
            DoctorProfileUpdate {
                consultation_fee: Some(150.0),
                experience_years: Some(12),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update profile");

    let after = service.list_doctors(None).await.expect("Failed to list doctors");
    assert_eq!(after[0].consultation_fee, 150.0, "Roster cache must be invalidated");
    assert_eq!(after[0].experience_years, 12);
}

#[tokio::test]
async fn test_profile_update_survives_cache_outage() {
    let clinic = TestClinic::new().await;
    let service = service_with(&clinic, Arc::new(DownCache));

    let updated = service
        .update_profile(
            &clinic.doctor_identity(),
            clinic.doctor.id,
            DoctorProfileUpdate {
                name: Some("Meredith Grey".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Cache outage must not fail the write");
    assert_eq!(updated.name, "Meredith Grey");

    let roster = service.list_doctors(None).await.expect("Failed to list doctors");
    assert_eq!(roster[0].name, "Meredith Grey");
}

#[tokio::test]
async fn test_profile_update_validation() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let identity = clinic.doctor_identity();

    let negative = service
        .update_profile(
            &identity,
            clinic.doctor.id,
            DoctorProfileUpdate {
                experience_years: Some(-1),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(negative, Err(DoctorError::ValidationError(_)));

    let blank_name = service
        .update_profile(
            &identity,
            clinic.doctor.id,
            DoctorProfileUpdate {
                name: Some("   ".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(blank_name, Err(DoctorError::ValidationError(_)));

    let someone_else = service
        .update_profile(&clinic.patient_identity(), clinic.doctor.id, DoctorProfileUpdate::default())
        .await;
    assert_matches!(someone_else, Err(DoctorError::Unauthorized(_)));
}

#[tokio::test]
async fn test_specialization_catalog() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();

    let created = service
        .create_specialization(&admin, "Cardiology", Some("Heart"))
        .await
        .expect("Failed to create specialization");

    let duplicate = service.create_specialization(&admin, "cardiology", None).await;
    assert_matches!(duplicate, Err(DoctorError::Conflict(_)));

    let not_admin = service
        .create_specialization(&clinic.doctor_identity(), "Oncology", None)
        .await;
    assert_matches!(not_admin, Err(DoctorError::Unauthorized(_)));

    let doctors = service
        .doctors_for_specialization(created.id)
        .await
        .expect("Failed to match doctors");
    assert_eq!(doctors.len(), 1, "Free-text specialization should match");
    assert_eq!(doctors[0].id, clinic.doctor.id);
}

#[tokio::test]
async fn test_derive_specializations_skips_existing_names() {
    let clinic = TestClinic::new().await;
    TestUser::doctor("Shepherd", "shepherd@hospital.com")
        .with_specialization("Neurology")
        .create(clinic.store.as_ref())
        .await;
    TestUser::doctor("Webber", "webber@hospital.com")
        .with_specialization(" neurology ")
        .create(clinic.store.as_ref())
        .await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();

    service
        .create_specialization(&admin, "Cardiology", None)
        .await
        .expect("Failed to create specialization");

    let derived = service
        .derive_specializations_from_doctors(&admin)
        .await
        .expect("Failed to derive specializations");
    assert_eq!(derived.len(), 1);
    assert_eq!(derived[0].name, "Neurology");

    let catalog = service.list_specializations().await.expect("Failed to list catalog");
    assert_eq!(catalog.len(), 2);
}
