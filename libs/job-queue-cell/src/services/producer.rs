use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_models::{Identity, Role};

use crate::services::queue::JobQueue;
use crate::{Job, JobHandle, JobKind, JobQueueError};

/// Accepts work for the background pipeline. Every call returns as soon as
/// the job is on the queue.
pub struct JobProducerService {
    queue: Arc<dyn JobQueue>,
}

impl JobProducerService {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Queues an export of the caller's own appointment history.
    pub async fn enqueue_export(&self, identity: &Identity) -> Result<JobHandle, JobQueueError> {
        if identity.role != Role::Patient {
            return Err(JobQueueError::Unauthorized("Patient access required".to_string()));
        }
        self.enqueue_kind(JobKind::ExportHistory {
            patient_id: identity.user_id,
        })
        .await
    }

    pub async fn enqueue_daily_reminders(&self) -> Result<JobHandle, JobQueueError> {
        self.enqueue_kind(JobKind::DailyReminders).await
    }

    pub async fn enqueue_monthly_reports(&self) -> Result<JobHandle, JobQueueError> {
        self.enqueue_kind(JobKind::MonthlyReports).await
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Job, JobQueueError> {
        self.queue
            .get(job_id)
            .await?
            .ok_or_else(|| JobQueueError::JobNotFound(job_id.to_string()))
    }

    pub(crate) async fn enqueue_kind(&self, kind: JobKind) -> Result<JobHandle, JobQueueError> {
        let job = Job::new(kind);
        self.queue.enqueue(&job).await?;
        info!("Queued {} job {}", job.kind.name(), job.job_id);
        Ok(JobHandle::for_job(&job))
    }
}
