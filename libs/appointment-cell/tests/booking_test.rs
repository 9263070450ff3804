use assert_matches::assert_matches;
use std::sync::Arc;

use appointment_cell::{
    AppointmentBookingService, AppointmentError, BookAppointmentRequest, RescheduleAppointmentRequest,
    TreatmentRequest, UpdateStatusRequest,
};
use shared_database::RecordStore;
use shared_models::{AppointmentFilter, AppointmentStatus, Identity, TreatmentFilter};
use shared_utils::test_utils::{date, time, TestClinic, TestUser};

fn service(clinic: &TestClinic) -> AppointmentBookingService {
    let store: Arc<dyn RecordStore> = clinic.store.clone();
    AppointmentBookingService::new(store, clinic.clock.clone())
}

fn booking(doctor_id: i64, day: &str, at: &str) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id: Some(doctor_id),
        date: Some(day.to_string()),
        time: Some(at.to_string()),
        notes: None,
    }
}

fn reschedule(day: &str, at: &str) -> RescheduleAppointmentRequest {
    RescheduleAppointmentRequest {
        date: Some(day.to_string()),
        time: Some(at.to_string()),
        notes: None,
    }
}

#[tokio::test]
async fn test_end_to_end_booking_scenario() {
    let clinic = TestClinic::new().await;
    let second = TestUser::patient("Sam Roe", "sam@example.com")
        .create(clinic.store.as_ref())
        .await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();
    let doctor = clinic.doctor.id;

    let booked = service
        .book_appointment(&patient, booking(doctor, "2025-03-10", "14:00"))
        .await
        .expect("Failed to book appointment");
    assert_eq!(booked.status, AppointmentStatus::Booked);

    let clash = service
        .book_appointment(&Identity::patient(second.id), booking(doctor, "2025-03-10", "14:00"))
        .await;
    assert_matches!(clash, Err(AppointmentError::ConflictDetected));

    let moved = service
        .reschedule_appointment(&patient, booked.id, reschedule("2025-03-10", "15:00"))
        .await
        .expect("Failed to reschedule");
    assert_eq!(moved.time, time("15:00"));
    assert_eq!(moved.id, booked.id);
    assert_eq!(moved.created_at, booked.created_at);

    let completed = service
        .update_status(
            &clinic.doctor_identity(),
            booked.id,
            UpdateStatusRequest {
                status: "completed".to_string(),
                diagnosis: Some("flu".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to complete appointment");
    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert_eq!(completed.diagnosis.as_deref(), Some("flu"));

    // cancelling a completed visit is deliberately permitted
    let cancelled = service
        .cancel_appointment(&patient, booked.id)
        .await
        .expect("Cancelling a completed appointment is allowed");
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_ne!(cancelled.status, AppointmentStatus::Booked);
}

#[tokio::test]
async fn test_booking_validation_order() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();

    let missing = service
        .book_appointment(
            &patient,
            BookAppointmentRequest {
                doctor_id: Some(clinic.doctor.id),
                date: Some("2025-03-10".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(missing, Err(AppointmentError::ValidationError(msg)) if msg.contains("time"));

    let not_a_doctor = service
        .book_appointment(&patient, booking(clinic.patient.id, "2025-03-10", "14:00"))
        .await;
    assert_matches!(not_a_doctor, Err(AppointmentError::DoctorNotFound));

    let malformed = service
        .book_appointment(&patient, booking(clinic.doctor.id, "10-03-2025", "14:00"))
        .await;
    assert_matches!(malformed, Err(AppointmentError::ValidationError(_)));

    let bad_time = service
        .book_appointment(&patient, booking(clinic.doctor.id, "2025-03-10", "2pm"))
        .await;
    assert_matches!(bad_time, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn test_booking_today_or_earlier_is_rejected() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();

    for day in ["2025-03-09", "2025-03-01"] {
        let result = service
            .book_appointment(&patient, booking(clinic.doctor.id, day, "23:59"))
            .await;
        assert_matches!(
            result,
            Err(AppointmentError::ValidationError(msg)) if msg.contains("future"),
            "{} should be rejected",
            day
        );
    }

    clinic.clock.advance(chrono::Duration::days(1));
    let result = service
        .book_appointment(&patient, booking(clinic.doctor.id, "2025-03-10", "14:00"))
        .await;
    assert_matches!(result, Err(AppointmentError::ValidationError(_)), "Clock is injected");
}

#[tokio::test]
async fn test_only_patients_book() {
    let clinic = TestClinic::new().await;
    let result = service(&clinic)
        .book_appointment(&clinic.doctor_identity(), booking(clinic.doctor.id, "2025-03-10", "14:00"))
        .await;
    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

#[tokio::test]
async fn test_cancelled_slot_can_be_rebooked() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();

    let first = service
        .book_appointment(&patient, booking(clinic.doctor.id, "2025-03-10", "14:00"))
        .await
        .expect("Failed to book appointment");
    service
        .cancel_appointment(&patient, first.id)
        .await
        .expect("Failed to cancel");

    let again = service
        .book_appointment(&patient, booking(clinic.doctor.id, "2025-03-10", "14:00"))
        .await
        .expect("Cancelled slot should be free");
    assert_ne!(again.id, first.id);

    let other_time = service
        .book_appointment(&patient, booking(clinic.doctor.id, "2025-03-10", "14:30"))
        .await;
    assert!(other_time.is_ok(), "A different time is a different slot");
}

#[tokio::test]
async fn test_reschedule_rules() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();
    let doctor = clinic.doctor.id;

    let mine = service
        .book_appointment(&patient, booking(doctor, "2025-03-10", "14:00"))
        .await
        .expect("Failed to book appointment");
    let taken = service
        .book_appointment(&patient, booking(doctor, "2025-03-10", "16:00"))
        .await
        .expect("Failed to book appointment");

    let same_slot = service
        .reschedule_appointment(&patient, mine.id, reschedule("2025-03-10", "14:00"))
        .await;
    assert!(same_slot.is_ok(), "Moving onto its own slot is not a conflict");

    let onto_other = service
        .reschedule_appointment(&patient, mine.id, reschedule("2025-03-10", "16:00"))
        .await;
    assert_matches!(onto_other, Err(AppointmentError::ConflictDetected));

    let intruder = TestUser::patient("Sam Roe", "sam@example.com")
        .create(clinic.store.as_ref())
        .await;
    let not_owner = service
        .reschedule_appointment(&Identity::patient(intruder.id), mine.id, reschedule("2025-03-12", "09:00"))
        .await;
    assert_matches!(not_owner, Err(AppointmentError::Unauthorized(_)));

    let missing = service
        .reschedule_appointment(&patient, 9999, reschedule("2025-03-12", "09:00"))
        .await;
    assert_matches!(missing, Err(AppointmentError::NotFound));

    service
        .cancel_appointment(&patient, taken.id)
        .await
        .expect("Failed to cancel");
    let from_cancelled = service
        .reschedule_appointment(&patient, taken.id, reschedule("2025-03-12", "09:00"))
        .await;
    assert_matches!(from_cancelled, Err(AppointmentError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn test_reschedule_replaces_notes_only_when_given() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();

    let booked = service
        .book_appointment(
            &patient,
            BookAppointmentRequest {
                notes: Some("first visit".to_string()),
                ..booking(clinic.doctor.id, "2025-03-10", "14:00")
            },
        )
        .await
        .expect("Failed to book appointment");

    let kept = service
        .reschedule_appointment(&patient, booked.id, reschedule("2025-03-11", "10:00"))
        .await
        .expect("Failed to reschedule");
    assert_eq!(kept.notes.as_deref(), Some("first visit"));

    let replaced = service
        .reschedule_appointment(
            &patient,
            booked.id,
            RescheduleAppointmentRequest {
                notes: Some("bring scans".to_string()),
                ..reschedule("2025-03-12", "10:00")
            },
        )
        .await
        .expect("Failed to reschedule");
    assert_eq!(replaced.notes.as_deref(), Some("bring scans"));
}

#[tokio::test]
async fn test_double_cancel_is_rejected() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let patient = clinic.patient_identity();

    let booked = service
        .book_appointment(&patient, booking(clinic.doctor.id, "2025-03-10", "14:00"))
        .await
        .expect("Failed to book appointment");
    service
        .cancel_appointment(&patient, booked.id)
        .await
        .expect("Failed to cancel");

    let again = service.cancel_appointment(&patient, booked.id).await;
    assert_matches!(
        again,
        Err(AppointmentError::InvalidStatusTransition(msg)) if msg == "Appointment already cancelled"
    );
}

#[tokio::test]
async fn test_update_status_rules() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let doctor = clinic.doctor_identity();

    let id = clinic
        .seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "14:00")
        .await;

    let invalid = service
        .update_status(
            &doctor,
            id,
            UpdateStatusRequest {
                status: "booked".to_string(),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(invalid, Err(AppointmentError::ValidationError(_)));

    let other_doctor = TestUser::doctor("Shepherd", "shepherd@hospital.com")
        .create(clinic.store.as_ref())
        .await;
    let not_assigned = service
        .update_status(
            &Identity::doctor(other_doctor.id),
            id,
            UpdateStatusRequest {
                status: "cancelled".to_string(),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(not_assigned, Err(AppointmentError::Unauthorized(_)));

    let cancelled = service
        .update_status(
            &doctor,
            id,
            UpdateStatusRequest {
                status: "cancelled".to_string(),
                notes: Some("patient unwell".to_string()),
                diagnosis: Some("ignored".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to cancel appointment");
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.notes.as_deref(), Some("patient unwell"));
    assert_eq!(cancelled.diagnosis, None, "Diagnosis is only stored on completion");

    let terminal = service
        .update_status(
            &doctor,
            id,
            UpdateStatusRequest {
                status: "completed".to_string(),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(terminal, Err(AppointmentError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn test_record_treatment_completes_booked_appointment() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let doctor = clinic.doctor_identity();

    let id = clinic
        .seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "14:00")
        .await;

    let missing_summary = service
        .record_treatment(
            &doctor,
            TreatmentRequest {
                appointment_id: Some(id),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(missing_summary, Err(AppointmentError::ValidationError(_)));

    let bad_follow_up = service
        .record_treatment(
            &doctor,
            TreatmentRequest {
                appointment_id: Some(id),
                summary: Some("Checked".to_string()),
                follow_up_date: Some("next week".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(bad_follow_up, Err(AppointmentError::ValidationError(_)));

    let record = service
        .record_treatment(
            &doctor,
            TreatmentRequest {
                appointment_id: Some(id),
                summary: Some("Seasonal flu".to_string()),
                diagnosis: Some("flu".to_string()),
                prescription: Some("rest".to_string()),
                follow_up_date: Some("2025-03-24".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to record treatment");
    assert_eq!(record.patient_id, clinic.patient.id);
    assert_eq!(record.follow_up_date, Some(date("2025-03-24")));

    let appointment = service
        .get_appointment(&doctor, id)
        .await
        .expect("Failed to load appointment");
    assert_eq!(appointment.status, AppointmentStatus::Completed);
    assert_eq!(appointment.diagnosis.as_deref(), Some("flu"));

    // a second note on a completed appointment leaves it as is
    service
        .record_treatment(
            &doctor,
            TreatmentRequest {
                appointment_id: Some(id),
                summary: Some("Follow-up call".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to record second treatment");

    let treatments = clinic
        .store
        .count_treatments(TreatmentFilter {
            patient_id: Some(clinic.patient.id),
            ..Default::default()
        })
        .await
        .expect("Failed to count treatments");
    assert_eq!(treatments, 2);
    let completed = clinic
        .store
        .count_appointments(AppointmentFilter::for_doctor(clinic.doctor.id).with_status(AppointmentStatus::Completed))
        .await
        .expect("Failed to count appointments");
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_get_appointment_visibility() {
    let clinic = TestClinic::new().await;
    let service = service(&clinic);
    let id = clinic
        .seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "14:00")
        .await;

    assert!(service.get_appointment(&clinic.patient_identity(), id).await.is_ok());
    assert!(service.get_appointment(&clinic.doctor_identity(), id).await.is_ok());
    assert!(service.get_appointment(&clinic.admin_identity(), id).await.is_ok());

    let stranger = service.get_appointment(&Identity::patient(clinic.patient.id + 50), id).await;
    assert_matches!(stranger, Err(AppointmentError::Unauthorized(_)));

    let missing = service.get_appointment(&clinic.admin_identity(), id + 50).await;
    assert_matches!(missing, Err(AppointmentError::NotFound));
}
