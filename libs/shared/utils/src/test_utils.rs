use chrono::{NaiveDate, NaiveTime};
use std::path::PathBuf;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::{InMemoryRecordStore, RecordStore};
use shared_models::{Identity, NewAppointment, NewUser, Role, User};

use crate::clock::FixedClock;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub export_dir: PathBuf,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            export_dir: std::env::temp_dir(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            export_dir: self.export_dir.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub specialization: Option<String>,
}

impl TestUser {
    pub fn new(name: &str, email: &str, role: Role) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            role,
            specialization: None,
        }
    }

    pub fn doctor(name: &str, email: &str) -> Self {
        Self::new(name, email, Role::Doctor)
    }

    pub fn patient(name: &str, email: &str) -> Self {
        Self::new(name, email, Role::Patient)
    }

    pub fn admin(name: &str, email: &str) -> Self {
        Self::new(name, email, Role::Admin)
    }

    pub fn with_specialization(mut self, specialization: &str) -> Self {
        self.specialization = Some(specialization.to_string());
        self
    }

    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            specialization: self.specialization.clone(),
            ..NewUser::new(self.name.clone(), self.email.clone(), self.role)
        }
    }

    /// Inserts the user; panics on failure since this only runs in tests.
    pub async fn create(&self, store: &dyn RecordStore) -> User {
        store
            .insert_user(self.to_new_user())
            .await
            .expect("Failed to insert test user")
    }
}

/// Seeded in-memory clinic: one admin, one doctor and one patient, with the
/// clock fixed on 2025-03-09.
pub struct TestClinic {
    pub store: Arc<InMemoryRecordStore>,
    pub clock: Arc<FixedClock>,
    pub admin: User,
    pub doctor: User,
    pub patient: User,
}

impl TestClinic {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let clock = Arc::new(FixedClock::on(date("2025-03-09")));

        let admin = TestUser::admin("Hospital Admin", "admin@hospital.com")
            .create(store.as_ref())
            .await;
        let doctor = TestUser::doctor("Grey", "grey@hospital.com")
            .with_specialization("Cardiology")
            .create(store.as_ref())
            .await;
        let patient = TestUser::patient("Pat Doe", "pat@example.com")
            .create(store.as_ref())
            .await;

        Self {
            store,
            clock,
            admin,
            doctor,
            patient,
        }
    }

    pub fn admin_identity(&self) -> Identity {
        Identity::admin(self.admin.id)
    }

    pub fn doctor_identity(&self) -> Identity {
        Identity::doctor(self.doctor.id)
    }

    pub fn patient_identity(&self) -> Identity {
        Identity::patient(self.patient.id)
    }

    /// Inserts a booked appointment directly, bypassing booking rules.
    pub async fn seed_appointment(&self, doctor_id: i64, patient_id: i64, day: &str, at: &str) -> i64 {
        self.store
            .insert_appointment(NewAppointment {
                patient_id,
                doctor_id,
                date: date(day),
                time: time(at),
                notes: None,
            })
            .await
            .expect("Failed to seed appointment")
            .id
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("Failed to parse test date")
}

pub fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").expect("Failed to parse test time")
}
