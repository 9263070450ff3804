use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::services::queue::JobQueue;
use crate::services::tasks::TaskRunner;
use crate::{Job, JobQueueError, JobStatus, WorkerConfig};

/// Pool of worker loops draining the job queue.
#[derive(Clone)]
pub struct JobWorkerService {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    runner: Arc<TaskRunner>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl JobWorkerService {
    pub fn new(config: WorkerConfig, queue: Arc<dyn JobQueue>, runner: Arc<TaskRunner>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue,
            runner,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Spawns `concurrency` worker loops. They stop after `shutdown()` once
    /// their current job is done.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(
            "Starting job worker {} with {} loops",
            self.config.worker_id, self.config.concurrency
        );

        (0..self.config.concurrency.max(1))
            .map(|i| {
                let worker = self.clone();
                let worker_name = format!("{}-{}", self.config.worker_id, i);
                tokio::spawn(async move { worker.worker_loop(worker_name).await })
            })
            .collect()
    }

    /// Requeues jobs a previous run left in `Processing`. A job untouched for
    /// longer than the job timeout can no longer be owned by a live worker.
    pub async fn recover_stalled_jobs(&self) -> Result<u64, JobQueueError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.job_timeout_seconds as i64);
        let recovered = self.queue.recover_stalled(cutoff).await?;
        if recovered > 0 {
            warn!("Recovered {} stalled jobs", recovered);
        }
        Ok(recovered)
    }

    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown for worker {}", self.config.worker_id);
        self.shutdown.send_replace(true);
    }

    async fn worker_loop(&self, worker_name: String) {
        debug!("Worker loop started: {}", worker_name);
        let mut shutdown = self.shutdown.subscribe();
        let idle = Duration::from_millis(self.config.poll_interval_ms);

        while !*shutdown.borrow() {
            match self.queue.dequeue(&worker_name).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job).await {
                        error!("Worker {} failed to record job result: {}", worker_name, e);
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(idle) => {}
                    }
                }
                Err(e) => {
                    error!("Worker {} failed to dequeue job: {}", worker_name, e);
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
    }

    /// Runs one dequeued job and records its result. A failed run is parked
    /// in the queue for the job's retry delay while budget remains.
    #[instrument(skip(self, job), fields(job_id = %job.job_id, kind = job.kind.name()))]
    pub async fn process_job(&self, job: Job) -> Result<Job, JobQueueError> {
        let started = Instant::now();
        let limit = Duration::from_secs(self.config.job_timeout_seconds);

        let result = match timeout(limit, self.runner.run(&job)).await {
            Ok(result) => result,
            Err(_) => Err(JobQueueError::WorkerTimeout {
                timeout_seconds: self.config.job_timeout_seconds,
            }),
        };

        match result {
            Ok(outcome) => {
                let job = self
                    .queue
                    .update_status(job.job_id, JobStatus::Completed, None, Some(outcome))
                    .await?;
                info!("Job {} completed in {}ms", job.job_id, started.elapsed().as_millis());
                Ok(job)
            }
            Err(e) if job.can_retry() => {
                let ready_at = Utc::now() + chrono::Duration::seconds(job.retry_delay_seconds as i64);
                let job = self
                    .queue
                    .schedule_retry(job.job_id, e.to_string(), ready_at)
                    .await?;
                warn!(
                    "Job {} failed: {}; retrying in {}s (attempt {}/{})",
                    job.job_id, e, job.retry_delay_seconds, job.retry_count, job.max_retries
                );
                Ok(job)
            }
            Err(e) => {
                let job = self
                    .queue
                    .update_status(job.job_id, JobStatus::Failed, Some(e.to_string()), None)
                    .await?;
                error!(
                    "Job {} failed permanently after {} retries: {}",
                    job.job_id, job.retry_count, e
                );
                Ok(job)
            }
        }
    }
}
