use chrono::{Datelike, NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use shared_database::RecordStore;
use shared_models::{
    Appointment, AppointmentFilter, AppointmentStatus, Role, SortOrder, TreatmentFilter, User,
    UserFilter, DATE_FORMAT, TIME_FORMAT,
};
use shared_utils::Clock;

use crate::services::mailer::Mailer;
use crate::{Email, Job, JobKind, JobOutcome, JobQueueError};

/// Executes the body of a job. Errors returned here are systemic and
/// eligible for retry; per-recipient mail failures are only counted.
pub struct TaskRunner {
    store: Arc<dyn RecordStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    export_dir: PathBuf,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn RecordStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            export_dir: export_dir.into(),
        }
    }

    pub async fn run(&self, job: &Job) -> Result<JobOutcome, JobQueueError> {
        match &job.kind {
            JobKind::DailyReminders => self.send_daily_reminders().await,
            JobKind::MonthlyReports => self.send_monthly_reports().await,
            JobKind::ExportHistory { patient_id } => self.export_history(job, *patient_id).await,
        }
    }

    /// Final path of the export written for `job`. Derived only from the job
    /// itself so that retries overwrite the same file.
    pub fn export_path(&self, job: &Job, patient_id: i64) -> PathBuf {
        self.export_dir.join(export_file_name(job, patient_id))
    }

    #[instrument(skip(self))]
    async fn send_daily_reminders(&self) -> Result<JobOutcome, JobQueueError> {
        let today = self.clock.today();
        let appointments = self
            .store
            .find_appointments(
                AppointmentFilter {
                    status: Some(AppointmentStatus::Booked),
                    date: Some(today),
                    ..Default::default()
                },
                SortOrder::Ascending,
                None,
            )
            .await?;

        let mut users = UserLookup::new(self.store.as_ref());
        let (mut sent, mut failed) = (0u32, 0u32);

        for appointment in &appointments {
            let Some(patient) = users.get(appointment.patient_id).await? else {
                warn!("Skipping reminder for appointment {}: patient missing", appointment.id);
                failed += 1;
                continue;
            };
            let doctor_name = users.display_name(appointment.doctor_id).await?;
            let email = reminder_email(&patient, appointment, &doctor_name);

            if self.mailer.send(&email).await {
                sent += 1;
            } else {
                failed += 1;
            }
        }

        info!("Daily reminders for {}: {} sent, {} failed", today, sent, failed);
        Ok(JobOutcome::RemindersSent { sent, failed })
    }

    #[instrument(skip(self))]
    async fn send_monthly_reports(&self) -> Result<JobOutcome, JobQueueError> {
        let (first, last) = previous_month(self.clock.today())
            .ok_or_else(|| JobQueueError::QueueError("Report period out of range".to_string()))?;
        let created_from = first.and_time(NaiveTime::MIN).and_utc();
        let created_before = last
            .succ_opt()
            .ok_or_else(|| JobQueueError::QueueError("Report period out of range".to_string()))?
            .and_time(NaiveTime::MIN)
            .and_utc();
        let period = first.format("%B %Y").to_string();

        let doctors = self
            .store
            .list_users(
                UserFilter {
                    role: Some(Role::Doctor),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let (mut sent, mut failed) = (0u32, 0u32);
        for doctor in &doctors {
            let in_month = AppointmentFilter::for_doctor(doctor.id).between(first, last);
            let report = MonthlyReport {
                total: self.store.count_appointments(in_month.clone()).await?,
                completed: self
                    .store
                    .count_appointments(in_month.clone().with_status(AppointmentStatus::Completed))
                    .await?,
                cancelled: self
                    .store
                    .count_appointments(in_month.with_status(AppointmentStatus::Cancelled))
                    .await?,
                treatments: self
                    .store
                    .count_treatments(TreatmentFilter {
                        doctor_id: Some(doctor.id),
                        created_from: Some(created_from),
                        created_before: Some(created_before),
                        ..Default::default()
                    })
                    .await?,
            };

            if self.mailer.send(&report.email(doctor, &period)).await {
                sent += 1;
            } else {
                failed += 1;
            }
        }

        info!("Monthly reports for {}: {} sent, {} failed", period, sent, failed);
        Ok(JobOutcome::ReportsSent { sent, failed })
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn export_history(&self, job: &Job, patient_id: i64) -> Result<JobOutcome, JobQueueError> {
        let Some(patient) = self.store.get_user(patient_id).await? else {
            warn!("Export requested for missing patient {}", patient_id);
            return Ok(JobOutcome::PatientNotFound { patient_id });
        };

        let appointments = self
            .store
            .find_appointments(AppointmentFilter::for_patient(patient_id), SortOrder::Descending, None)
            .await?;

        let mut users = UserLookup::new(self.store.as_ref());
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.write_record(["Date", "Time", "Doctor", "Status", "Notes"])?;
        for appointment in &appointments {
            let doctor_name = users.display_name(appointment.doctor_id).await?;
            writer.write_record([
                appointment.date.format(DATE_FORMAT).to_string(),
                appointment.time.format(TIME_FORMAT).to_string(),
                doctor_name,
                appointment.status.to_string(),
                appointment.notes.clone().unwrap_or_default(),
            ])?;
        }
        let data = writer
            .into_inner()
            .map_err(|e| JobQueueError::ExportError(e.to_string()))?;

        tokio::fs::create_dir_all(&self.export_dir).await?;
        let file_name = export_file_name(job, patient_id);
        tokio::fs::write(self.export_dir.join(&file_name), data).await?;

        let records = appointments.len() as u32;
        debug!("Wrote {} appointment rows to {}", records, file_name);

        let notified = self.mailer.send(&export_email(&patient, &file_name, records)).await;
        if !notified {
            warn!("Export {} written but the completion notice was not delivered", file_name);
        }

        Ok(JobOutcome::Exported {
            file_name,
            records,
            notified,
        })
    }
}

pub fn export_file_name(job: &Job, patient_id: i64) -> String {
    format!(
        "appointments_export_{}_{}_{}.csv",
        patient_id,
        job.created_at.format("%Y%m%d_%H%M%S"),
        job.job_id.simple()
    )
}

/// First and last day of the calendar month before `today`.
pub fn previous_month(today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let last = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?.pred_opt()?;
    let first = NaiveDate::from_ymd_opt(last.year(), last.month(), 1)?;
    Some((first, last))
}

/// Per-run memo of user rows; a run touches the same doctors repeatedly.
struct UserLookup<'a> {
    store: &'a dyn RecordStore,
    seen: HashMap<i64, Option<User>>,
}

impl<'a> UserLookup<'a> {
    fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            seen: HashMap::new(),
        }
    }

    async fn get(&mut self, id: i64) -> Result<Option<User>, JobQueueError> {
        if let Some(user) = self.seen.get(&id) {
            return Ok(user.clone());
        }
        let user = self.store.get_user(id).await?;
        self.seen.insert(id, user.clone());
        Ok(user)
    }

    async fn display_name(&mut self, id: i64) -> Result<String, JobQueueError> {
        Ok(self
            .get(id)
            .await?
            .map(|user| user.display_name())
            .unwrap_or_else(|| "Unknown doctor".to_string()))
    }
}

struct MonthlyReport {
    total: u64,
    completed: u64,
    cancelled: u64,
    treatments: u64,
}

impl MonthlyReport {
    fn email(&self, doctor: &User, period: &str) -> Email {
        Email {
            to: doctor.email.clone(),
            subject: format!("Monthly Activity Report - {}", period),
            html_body: format!(
                "<h2>Monthly Activity Report</h2>\
                 <p>Hello {}, here is your activity for {}.</p>\
                 <ul>\
                 <li>Total appointments: {}</li>\
                 <li>Completed: {}</li>\
                 <li>Cancelled: {}</li>\
                 <li>Treatment records: {}</li>\
                 </ul>",
                doctor.display_name(),
                period,
                self.total,
                self.completed,
                self.cancelled,
                self.treatments
            ),
            text_body: format!(
                "Hello {}, here is your activity for {}.\n\
                 Total appointments: {}\nCompleted: {}\nCancelled: {}\nTreatment records: {}\n",
                doctor.display_name(),
                period,
                self.total,
                self.completed,
                self.cancelled,
                self.treatments
            ),
        }
    }
}

fn reminder_email(patient: &User, appointment: &Appointment, doctor_name: &str) -> Email {
    let date = appointment.date.format(DATE_FORMAT).to_string();
    let time = appointment.time.format(TIME_FORMAT).to_string();
    Email {
        to: patient.email.clone(),
        subject: format!("Appointment Reminder - {}", date),
        html_body: format!(
            "<h2>Appointment Reminder</h2>\
             <p>Dear {},</p>\
             <p>This is a reminder of your appointment today.</p>\
             <ul><li>Date: {}</li><li>Time: {}</li><li>Doctor: {}</li></ul>",
            patient.name, date, time, doctor_name
        ),
        text_body: format!(
            "Dear {},\nThis is a reminder of your appointment today.\nDate: {}\nTime: {}\nDoctor: {}\n",
            patient.name, date, time, doctor_name
        ),
    }
}

fn export_email(patient: &User, file_name: &str, records: u32) -> Email {
    Email {
        to: patient.email.clone(),
        subject: "Your appointment history export is ready".to_string(),
        html_body: format!(
            "<p>Dear {},</p><p>Your export of {} appointment(s) is ready: <code>{}</code></p>",
            patient.name, records, file_name
        ),
        text_body: format!(
            "Dear {},\nYour export of {} appointment(s) is ready: {}\n",
            patient.name, records, file_name
        ),
    }
}
