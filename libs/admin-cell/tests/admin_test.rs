use assert_matches::assert_matches;
use std::sync::Arc;

use admin_cell::{AdminError, AdminService, CreateUserRequest, UpdateUserRequest, UserSearchQuery};
use cache_cell::{doctor_availability_key, DirectoryCache, InMemoryCache, MockCacheBackend, DOCTORS_LIST_KEY};
use mockall::predicate::function;
use shared_database::RecordStore;
use shared_models::{AppointmentStatus, Page, Role};
use shared_utils::test_utils::{date, TestClinic, TestUser};

fn service(clinic: &TestClinic) -> AdminService {
    let cache = Arc::new(DirectoryCache::new(Arc::new(InMemoryCache::new()), clinic.store.clone()));
    AdminService::new(clinic.store.clone(), cache)
}

fn create_request(name: &str, email: &str, role: &str) -> CreateUserRequest {
    CreateUserRequest {
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        role: Some(role.to_string()),
        ..Default::default()
    }
}

async fn set_status(clinic: &TestClinic, id: i64, status: AppointmentStatus) {
    let mut appointment = clinic
        .store
        .get_appointment(id)
        .await
        .expect("Failed to load appointment")
        .expect("Appointment should exist");
    appointment.status = status;
    clinic
        .store
        .update_appointment(appointment, AppointmentStatus::Booked)
        .await
        .expect("Failed to update appointment");
}

#[tokio::test]
async fn test_create_user_only_doctor_or_patient() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();

    let doctor = service
        .create_user(
            &admin,
            CreateUserRequest {
                specialization: Some(" Neurology ".to_string()),
                ..create_request("House", "house@hospital.com", "doctor")
            },
        )
        .await
        .expect("Failed to create doctor");
    assert_eq!(doctor.role, Role::Doctor);
    assert_eq!(doctor.specialization.as_deref(), Some("Neurology"));

    let second_admin = service
        .create_user(&admin, create_request("Boss", "boss@hospital.com", "admin"))
        .await;
    assert_matches!(second_admin, Err(AdminError::ValidationError(msg)) if msg == "Role must be doctor or patient");

    let nurse = service
        .create_user(&admin, create_request("Nurse", "nurse@hospital.com", "nurse"))
        .await;
    assert_matches!(nurse, Err(AdminError::ValidationError(_)));

    let duplicate = service
        .create_user(&admin, create_request("Again", "HOUSE@hospital.com", "patient"))
        .await;
    assert_matches!(duplicate, Err(AdminError::EmailAlreadyExists));

    let missing = service.create_user(&admin, CreateUserRequest::default()).await;
    assert_matches!(missing, Err(AdminError::ValidationError(msg)) if msg == "name is required");
}

#[tokio::test]
async fn test_operations_require_admin() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let doctor = clinic.doctor_identity();

    assert_matches!(
        service.create_user(&doctor, create_request("X", "x@example.com", "patient")).await,
        Err(AdminError::Unauthorized(_))
    );
    assert_matches!(
        service.delete_user(&doctor, clinic.patient.id).await,
        Err(AdminError::Unauthorized(_))
    );
    assert_matches!(service.system_stats(&doctor).await, Err(AdminError::Unauthorized(_)));
}

#[tokio::test]
async fn test_created_doctor_appears_in_cached_roster() {
    let clinic = TestClinic::new().await;
    let cache = Arc::new(DirectoryCache::new(Arc::new(InMemoryCache::new()), clinic.store.clone()));
    let service = AdminService::new(clinic.store.clone(), cache.clone());

    let before = cache.doctors_list().await.expect("Failed to list doctors");
    assert_eq!(before.len(), 1);

    service
        .create_user(&clinic.admin_identity(), create_request("House", "house@hospital.com", "doctor"))
        .await
        .expect("Failed to create doctor");

    let after = cache.doctors_list().await.expect("Failed to list doctors");
    assert_eq!(after.len(), 2, "Roster must not be served stale after creating a doctor");
}

#[tokio::test]
async fn test_update_user_rules() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();
    let other_admin = TestUser::admin("Second Admin", "second@hospital.com")
        .create(clinic.store.as_ref())
        .await;

    let blocked = service
        .update_user(&admin, other_admin.id, UpdateUserRequest {
            name: Some("Renamed".to_string()),
            ..Default::default()
        })
        .await;
    assert_matches!(blocked, Err(AdminError::Unauthorized(msg)) if msg == "Cannot update other admin accounts");

    let taken = service
        .update_user(&admin, clinic.patient.id, UpdateUserRequest {
            email: Some("grey@hospital.com".to_string()),
            ..Default::default()
        })
        .await;
    assert_matches!(taken, Err(AdminError::EmailAlreadyExists));

    let updated = service
        .update_user(&admin, clinic.doctor.id, UpdateUserRequest {
            phone: Some("555-0111".to_string()),
            ..Default::default()
        })
        .await
        .expect("Failed to update doctor");
    assert_eq!(updated.phone.as_deref(), Some("555-0111"));

    let own = service
        .update_user(&admin, clinic.admin.id, UpdateUserRequest {
            name: Some("Chief Admin".to_string()),
            ..Default::default()
        })
        .await
        .expect("Admins may edit their own account");
    assert_eq!(own.name, "Chief Admin");

    assert_matches!(
        service.update_user(&admin, 999, UpdateUserRequest::default()).await,
        Err(AdminError::UserNotFound)
    );
}

#[tokio::test]
async fn test_delete_blocked_by_booked_appointment() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();

    let id = clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "10:00").await;

    assert_matches!(
        service.delete_user(&admin, clinic.patient.id).await,
        Err(AdminError::ActiveAppointments)
    );
    assert_matches!(
        service.delete_user(&admin, clinic.doctor.id).await,
        Err(AdminError::ActiveAppointments)
    );

    set_status(&clinic, id, AppointmentStatus::Completed).await;
    service
        .delete_user(&admin, clinic.patient.id)
        .await
        .expect("Completed history must not block deletion");

    assert!(clinic
        .store
        .get_user(clinic.patient.id)
        .await
        .expect("Failed to read user")
        .is_none());
    let kept = clinic
        .store
        .get_appointment(id)
        .await
        .expect("Failed to read appointment");
    assert!(kept.is_some(), "Appointment history is retained");
}

#[tokio::test]
async fn test_admin_accounts_cannot_be_deleted() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);

    let result = service.delete_user(&clinic.admin_identity(), clinic.admin.id).await;

    assert_matches!(result, Err(AdminError::Unauthorized(msg)) if msg == "Cannot delete admin accounts");
    assert_matches!(
        service.delete_user(&clinic.admin_identity(), 999).await,
        Err(AdminError::UserNotFound)
    );
}

#[tokio::test]
async fn test_deleting_doctor_drops_roster_and_availability_keys() {
    let clinic = TestClinic::new().await;
    let availability_key = doctor_availability_key(clinic.doctor.id);
    let mut backend = MockCacheBackend::new();
    backend
        .expect_delete()
        .with(function(|key: &str| key == DOCTORS_LIST_KEY))
        .times(1)
        .returning(|_| Ok(()));
    backend
        .expect_delete()
        .with(function(move |key: &str| key == availability_key))
        .times(1)
        .returning(|_| Ok(()));
    let cache = Arc::new(DirectoryCache::new(Arc::new(backend), clinic.store.clone()));
    let service = AdminService::new(clinic.store.clone(), cache);

    service
        .delete_user(&clinic.admin_identity(), clinic.doctor.id)
        .await
        .expect("Failed to delete doctor");
}

#[tokio::test]
async fn test_search_users_excludes_admins() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();
    TestUser::patient("Grace Hopper", "grace@example.com")
        .create(clinic.store.as_ref())
        .await;

    let everyone = service
        .search_users(&admin, UserSearchQuery::default(), Page::default())
        .await
        .expect("Failed to search users");
    assert_eq!(everyone.total, 3);
    assert!(everyone.items.iter().all(|u| !u.is_admin()));

    let by_name = service
        .search_users(
            &admin,
            UserSearchQuery {
                q: Some("gr".to_string()),
                role: Some("patient".to_string()),
            },
            Page::default(),
        )
        .await
        .expect("Failed to search users");
    assert_eq!(by_name.total, 1);
    assert_eq!(by_name.items[0].email, "grace@example.com");

    let admins = service
        .search_users(
            &admin,
            UserSearchQuery {
                q: Some("admin".to_string()),
                role: None,
            },
            Page::default(),
        )
        .await
        .expect("Failed to search users");
    assert_eq!(admins.total, 0);
}

#[tokio::test]
async fn test_list_appointments_and_stats() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let admin = clinic.admin_identity();

    clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "09:00").await;
    let completed = clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-11", "09:00").await;
    let cancelled = clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-12", "09:00").await;
    set_status(&clinic, completed, AppointmentStatus::Completed).await;
    set_status(&clinic, cancelled, AppointmentStatus::Cancelled).await;

    let all = service
        .list_appointments(&admin, None, Page::default())
        .await
        .expect("Failed to list appointments");
    assert_eq!(all.total, 3);
    assert_eq!(all.items[0].date, date("2025-03-12"), "Newest appointment first");

    let only_booked = service
        .list_appointments(&admin, Some(AppointmentStatus::Booked), Page::default())
        .await
        .expect("Failed to list appointments");
    assert_eq!(only_booked.total, 1);

    let stats = service.system_stats(&admin).await.expect("Failed to load stats");
    assert_eq!(stats.total_doctors, 1);
    assert_eq!(stats.total_patients, 1);
    assert_eq!(stats.total_appointments, 3);
    assert_eq!(stats.booked_appointments, 1);
    assert_eq!(stats.completed_appointments, 1);
    assert_eq!(stats.cancelled_appointments, 1);
}

#[tokio::test]
async fn test_ensure_admin_is_idempotent() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);

    let existing = service
        .ensure_admin("Hospital Admin", "admin@hospital.com")
        .await
        .expect("Failed to ensure admin");
    assert_eq!(existing.id, clinic.admin.id);

    let created = service
        .ensure_admin("Ops Admin", "ops@hospital.com")
        .await
        .expect("Failed to create admin");
    let again = service
        .ensure_admin("Ops Admin", "ops@hospital.com")
        .await
        .expect("Failed to ensure admin");
    assert_eq!(created.id, again.id);
    assert_eq!(again.role, Role::Admin);

    assert_matches!(
        service.ensure_admin("Pat", "pat@example.com").await,
        Err(AdminError::ValidationError(_))
    );
}
