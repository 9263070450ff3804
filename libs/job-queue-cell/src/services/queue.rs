use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Job, JobOutcome, JobQueueError, JobStatus, QueueStats};

/// Durable FIFO of background jobs plus their latest state.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &Job) -> Result<(), JobQueueError>;

    /// Next pending job, marked `Processing` and assigned to `worker_id`.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<Job>, JobQueueError>;

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        outcome: Option<JobOutcome>,
    ) -> Result<Job, JobQueueError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobQueueError>;

    /// Marks a `Processing` job `Retrying`, bumps its retry counter and parks
    /// it until `ready_at`. Parked jobs are kept by the queue itself, so a
    /// worker restart does not drop them; `dequeue` hands them out once due.
    async fn schedule_retry(
        &self,
        job_id: Uuid,
        error_message: String,
        ready_at: DateTime<Utc>,
    ) -> Result<Job, JobQueueError>;

    /// Jobs still `Processing` with no update since `stalled_before` lost
    /// their worker. They are parked for an immediate retry, or failed when
    /// their budget is spent. Returns how many were recovered.
    async fn recover_stalled(&self, stalled_before: DateTime<Utc>) -> Result<u64, JobQueueError>;

    async fn stats(&self) -> Result<QueueStats, JobQueueError>;
}

pub(crate) fn apply_status(
    job: &mut Job,
    status: JobStatus,
    error_message: Option<String>,
    outcome: Option<JobOutcome>,
) -> Result<(), JobQueueError> {
    let from = job.status;
    if !job.transition(status, Utc::now()) {
        return Err(JobQueueError::InvalidStatusTransition {
            from: from.to_string(),
            to: status.to_string(),
        });
    }
    if error_message.is_some() {
        job.error_message = error_message;
    }
    if outcome.is_some() {
        job.outcome = outcome;
    }
    debug!("Job {} status updated from {} to {}", job.job_id, from, status);
    Ok(())
}

pub(crate) fn prepare_retry(job: &mut Job, error_message: String) -> Result<(), JobQueueError> {
    if !job.can_retry() {
        return Err(JobQueueError::MaxRetriesExceeded {
            job_id: job.job_id.to_string(),
            max_retries: job.max_retries,
        });
    }
    apply_status(job, JobStatus::Retrying, Some(error_message), None)?;
    job.retry_count += 1;
    job.worker_id = None;
    Ok(())
}

pub(crate) const STALLED_MESSAGE: &str = "Worker stopped before the job finished";

pub(crate) fn is_stalled(job: &Job, stalled_before: DateTime<Utc>) -> bool {
    job.status == JobStatus::Processing && job.updated_at < stalled_before
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
    delayed: Vec<(DateTime<Utc>, Uuid)>,
}

impl QueueState {
    fn promote_due(&mut self, now: DateTime<Utc>) {
        self.delayed.sort();
        let due = self.delayed.partition_point(|(ready_at, _)| *ready_at <= now);
        for (_, job_id) in self.delayed.drain(..due) {
            self.pending.push_back(job_id);
        }
    }

    fn park(&mut self, job_id: Uuid, error_message: String, ready_at: DateTime<Utc>) -> Result<Job, JobQueueError> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| JobQueueError::JobNotFound(job_id.to_string()))?;
        prepare_retry(job, error_message)?;
        let job = job.clone();
        self.delayed.push((ready_at, job_id));
        Ok(job)
    }
}

/// Single-process queue for tests and Redis-less development.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.job_id, job.clone());
        state.pending.push_back(job.job_id);
        debug!("Job {} enqueued", job.job_id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<Job>, JobQueueError> {
        let mut state = self.state.lock().await;
        state.promote_due(Utc::now());
        while let Some(job_id) = state.pending.pop_front() {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            apply_status(job, JobStatus::Processing, None, None)?;
            job.worker_id = Some(worker_id.to_string());
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        outcome: Option<JobOutcome>,
    ) -> Result<Job, JobQueueError> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| JobQueueError::JobNotFound(job_id.to_string()))?;
        apply_status(job, status, error_message, outcome)?;
        Ok(job.clone())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobQueueError> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn schedule_retry(
        &self,
        job_id: Uuid,
        error_message: String,
        ready_at: DateTime<Utc>,
    ) -> Result<Job, JobQueueError> {
        let job = self.state.lock().await.park(job_id, error_message, ready_at)?;
        info!("Job {} parked for retry {}/{} until {}", job_id, job.retry_count, job.max_retries, ready_at);
        Ok(job)
    }

    async fn recover_stalled(&self, stalled_before: DateTime<Utc>) -> Result<u64, JobQueueError> {
        let mut state = self.state.lock().await;
        let stalled: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|job| is_stalled(job, stalled_before))
            .map(|job| job.job_id)
            .collect();

        let now = Utc::now();
        for job_id in &stalled {
            if let Err(JobQueueError::MaxRetriesExceeded { .. }) =
                state.park(*job_id, STALLED_MESSAGE.to_string(), now)
            {
                if let Some(job) = state.jobs.get_mut(job_id) {
                    apply_status(job, JobStatus::Failed, Some(STALLED_MESSAGE.to_string()), None)?;
                }
            }
        }
        Ok(stalled.len() as u64)
    }

    async fn stats(&self) -> Result<QueueStats, JobQueueError> {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued_jobs += 1,
                JobStatus::Processing => stats.processing_jobs += 1,
                JobStatus::Retrying => stats.retrying_jobs += 1,
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
            }
        }
        Ok(stats)
    }
}
