use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// JOBS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    DailyReminders,
    MonthlyReports,
    ExportHistory { patient_id: i64 },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::DailyReminders => "daily_reminders",
            JobKind::MonthlyReports => "monthly_reports",
            JobKind::ExportHistory { .. } => "export_history",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, target),
            (Queued, Processing)
                | (Retrying, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Retrying)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fixed-backoff retry bound. `max_retries` counts re-runs after the first
/// attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl RetryPolicy {
    pub fn for_kind(kind: &JobKind) -> Self {
        match kind {
            JobKind::DailyReminders | JobKind::MonthlyReports => Self {
                max_retries: 3,
                retry_delay_seconds: 300,
            },
            JobKind::ExportHistory { .. } => Self {
                max_retries: 3,
                retry_delay_seconds: 60,
            },
        }
    }
}

/// What a finished job produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    RemindersSent { sent: u32, failed: u32 },
    ReportsSent { sent: u32, failed: u32 },
    Exported { file_name: String, records: u32, notified: bool },
    PatientNotFound { patient_id: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub outcome: Option<JobOutcome>,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self::with_policy(kind.clone(), RetryPolicy::for_kind(&kind))
    }

    pub fn with_policy(kind: JobKind, policy: RetryPolicy) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries: policy.max_retries,
            retry_delay_seconds: policy.retry_delay_seconds,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            worker_id: None,
            outcome: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Applies a validated status change in place.
    pub fn transition(&mut self, status: JobStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(&status) {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        true
    }
}

/// Returned to the caller as soon as a job is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub tracking_url: String,
}

impl JobHandle {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            tracking_url: format!("/jobs/{}", job.job_id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub queued_jobs: u64,
    pub processing_jobs: u64,
    pub retrying_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}

// ==============================================================================
// WORKERS & MAIL
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: usize,
    pub job_timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4().simple()),
            concurrency: 4,
            job_timeout_seconds: 300,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}
