use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use job_queue_cell::{Email, Job, JobKind, JobOutcome, JobQueueError, Mailer, TaskRunner};
use shared_database::RecordStore;
use shared_models::{AppointmentStatus, NewAppointment, NewTreatment};
use shared_utils::test_utils::{date, time, TestClinic, TestUser};
use shared_utils::FixedClock;

/// Captures every message; addresses in `rejected` fail delivery.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    rejected: HashSet<String>,
}

impl RecordingMailer {
    fn rejecting(address: &str) -> Self {
        Self {
            rejected: HashSet::from([address.to_string()]),
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<Email> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> bool {
        if self.rejected.contains(&email.to) {
            return false;
        }
        self.sent.lock().expect("mailer lock poisoned").push(email.clone());
        true
    }
}

fn runner(clinic: &TestClinic, mailer: Arc<RecordingMailer>, export_dir: &std::path::Path) -> TaskRunner {
    TaskRunner::new(clinic.store.clone(), mailer, clinic.clock.clone(), export_dir)
}

#[tokio::test]
async fn test_daily_reminders_cover_todays_booked_appointments() {
    let clinic = TestClinic::new().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mailer = Arc::new(RecordingMailer::default());

    clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-09", "10:00").await;
    clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "10:00").await;
    let cancelled = clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-09", "11:00").await;
    let mut appointment = clinic
        .store
        .get_appointment(cancelled)
        .await
        .expect("Failed to load appointment")
        .expect("Appointment should exist");
    appointment.status = AppointmentStatus::Cancelled;
    clinic
        .store
        .update_appointment(appointment, AppointmentStatus::Booked)
        .await
        .expect("Failed to cancel");

    let outcome = runner(&clinic, mailer.clone(), dir.path())
        .run(&Job::new(JobKind::DailyReminders))
        .await
        .expect("Failed to send reminders");

    assert_eq!(outcome, JobOutcome::RemindersSent { sent: 1, failed: 0 });
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "pat@example.com");
    assert_eq!(sent[0].subject, "Appointment Reminder - 2025-03-09");
    assert!(sent[0].text_body.contains("10:00"), "Reminder should name the time");
    assert!(sent[0].html_body.contains("Dr. Grey"), "Reminder should name the doctor");
}

#[tokio::test]
async fn test_reminder_delivery_failure_is_counted_not_raised() {
    let clinic = TestClinic::new().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let other = TestUser::patient("Bounce", "bounce@example.com")
        .create(clinic.store.as_ref())
        .await;
    let mailer = Arc::new(RecordingMailer::rejecting("bounce@example.com"));

    clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-09", "09:00").await;
    clinic.seed_appointment(clinic.doctor.id, other.id, "2025-03-09", "09:30").await;

    let outcome = runner(&clinic, mailer.clone(), dir.path())
        .run(&Job::new(JobKind::DailyReminders))
        .await
        .expect("Mail failures must not fail the job");

    assert_eq!(outcome, JobOutcome::RemindersSent { sent: 1, failed: 1 });
}

#[tokio::test]
async fn test_monthly_report_counts_previous_month() {
    let clinic = TestClinic::new().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mailer = Arc::new(RecordingMailer::default());

    // Treatment rows are stamped with the real time, so report on the
    // current month by standing on the 1st of the next one.
    let today = Utc::now().date_naive();
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).expect("valid date");
    let next_month = (month_start + chrono::Duration::days(32))
        .with_day(1)
        .expect("valid date");
    let clock = Arc::new(FixedClock::on(next_month));

    let booked = clinic.store.insert_appointment(NewAppointment {
        patient_id: clinic.patient.id,
        doctor_id: clinic.doctor.id,
        date: month_start,
        time: time("09:00"),
        notes: None,
    });
    let booked = booked.await.expect("Failed to seed appointment");
    let mut completed = booked.clone();
    completed.status = AppointmentStatus::Completed;
    clinic
        .store
        .record_treatment(
            NewTreatment {
                appointment_id: booked.id,
                doctor_id: clinic.doctor.id,
                patient_id: clinic.patient.id,
                summary: "Checkup".to_string(),
                diagnosis: None,
                prescription: None,
                treatment_notes: None,
                follow_up_date: None,
            },
            Some(completed),
        )
        .await
        .expect("Failed to record treatment");
    clinic
        .store
        .insert_appointment(NewAppointment {
            patient_id: clinic.patient.id,
            doctor_id: clinic.doctor.id,
            date: month_start,
            time: time("10:00"),
            notes: None,
        })
        .await
        .expect("Failed to seed appointment");
    clinic
        .store
        .insert_appointment(NewAppointment {
            patient_id: clinic.patient.id,
            doctor_id: clinic.doctor.id,
            date: next_month,
            time: time("10:00"),
            notes: None,
        })
        .await
        .expect("Failed to seed appointment");

    let runner = TaskRunner::new(clinic.store.clone(), mailer.clone(), clock, dir.path());
    let outcome = runner
        .run(&Job::new(JobKind::MonthlyReports))
        .await
        .expect("Failed to send reports");

    assert_eq!(outcome, JobOutcome::ReportsSent { sent: 1, failed: 0 });
    let sent = mailer.sent();
    assert_eq!(sent[0].to, "grey@hospital.com");
    assert_eq!(
        sent[0].subject,
        format!("Monthly Activity Report - {}", month_start.format("%B %Y"))
    );
    assert!(sent[0].text_body.contains("Total appointments: 2"), "{}", sent[0].text_body);
    assert!(sent[0].text_body.contains("Completed: 1"), "{}", sent[0].text_body);
    assert!(sent[0].text_body.contains("Treatment records: 1"), "{}", sent[0].text_body);
}

#[tokio::test]
async fn test_export_writes_csv_newest_first() {
    let clinic = TestClinic::new().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mailer = Arc::new(RecordingMailer::default());

    clinic.seed_appointment(clinic.doctor.id, clinic.patient.id, "2025-03-10", "09:00").await;
    clinic
        .store
        .insert_appointment(NewAppointment {
            patient_id: clinic.patient.id,
            doctor_id: clinic.doctor.id,
            date: date("2025-03-12"),
            time: time("14:30"),
            notes: Some("Bring scans, please".to_string()),
        })
        .await
        .expect("Failed to seed appointment");

    let job = Job::new(JobKind::ExportHistory {
        patient_id: clinic.patient.id,
    });
    let runner = runner(&clinic, mailer.clone(), dir.path());
    let outcome = runner.run(&job).await.expect("Failed to export");

    let path = runner.export_path(&job, clinic.patient.id);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .expect("Export path should have a file name")
        .to_string();
    assert_eq!(
        outcome,
        JobOutcome::Exported {
            file_name: file_name.clone(),
            records: 2,
            notified: true,
        }
    );

    let contents = std::fs::read_to_string(&path).expect("Failed to read export");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "Date,Time,Doctor,Status,Notes");
    assert_eq!(lines[1], "2025-03-12,14:30,Dr. Grey,booked,\"Bring scans, please\"");
    assert_eq!(lines[2], "2025-03-10,09:00,Dr. Grey,booked,");

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text_body.contains(&file_name), "Notice should name the file");
    assert!(sent[0].text_body.contains("2 appointment"), "Notice should give the record count");
}

#[tokio::test]
async fn test_export_file_name_stable_per_job_unique_across_jobs() {
    let clinic = TestClinic::new().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mailer = Arc::new(RecordingMailer::default());
    let runner = runner(&clinic, mailer, dir.path());
    let kind = JobKind::ExportHistory {
        patient_id: clinic.patient.id,
    };

    let first = Job::new(kind.clone());
    let mut second = Job::new(kind);
    second.created_at = first.created_at;

    let run_one = runner.run(&first).await.expect("Failed to export");
    let run_two = runner.run(&first).await.expect("Failed to export again");
    let other = runner.run(&second).await.expect("Failed to export second job");

    let name = |outcome: &JobOutcome| match outcome {
        JobOutcome::Exported { file_name, .. } => file_name.clone(),
        other => panic!("Unexpected outcome {:?}", other),
    };
    assert_eq!(name(&run_one), name(&run_two), "A retried job must reuse its file");
    assert_ne!(name(&run_one), name(&other), "Concurrent jobs must not share a file");

    let files = std::fs::read_dir(dir.path()).expect("Failed to list exports").count();
    assert_eq!(files, 2);
}

#[tokio::test]
async fn test_export_for_missing_patient_completes_without_file() {
    let clinic = TestClinic::new().await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mailer = Arc::new(RecordingMailer::default());

    let outcome = runner(&clinic, mailer.clone(), dir.path())
        .run(&Job::new(JobKind::ExportHistory { patient_id: 999 }))
        .await
        .expect("Missing patient is not a systemic failure");

    assert_eq!(outcome, JobOutcome::PatientNotFound { patient_id: 999 });
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_export_write_failure_is_an_error() {
    let clinic = TestClinic::new().await;
    let blocker = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let mailer = Arc::new(RecordingMailer::default());

    // a regular file where the export directory should be
    let result = runner(&clinic, mailer, blocker.path())
        .run(&Job::new(JobKind::ExportHistory {
            patient_id: clinic.patient.id,
        }))
        .await;

    assert_matches!(result, Err(JobQueueError::ExportError(_)));
}
