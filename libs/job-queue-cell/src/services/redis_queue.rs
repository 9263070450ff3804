use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::services::queue::{apply_status, is_stalled, prepare_retry, JobQueue, STALLED_MESSAGE};
use crate::{Job, JobOutcome, JobQueueError, JobStatus, QueueStats};

const PENDING_KEY: &str = "job_queue:pending";
const PROCESSING_KEY: &str = "job_queue:processing";
/// Sorted set of parked retries, scored by ready-at in epoch milliseconds.
const DELAYED_KEY: &str = "job_queue:delayed";
// 7 days
const JOB_TTL_SECONDS: i64 = 604800;

/// Moves every due id from the delayed set to the pending list in one step,
/// so concurrent workers never promote the same id twice.
const PROMOTE_DUE: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(due) do
    redis.call('ZREM', KEYS[1], id)
    redis.call('LPUSH', KEYS[2], id)
end
return #due
";

fn job_key(job_id: Uuid) -> String {
    format!("job:{}", job_id)
}

fn counter_key(status: JobStatus) -> String {
    format!("job_queue:count:{}", status)
}

/// Jobs live in `job:{id}` hashes; ids move between a pending and a
/// processing list.
pub struct RedisJobQueue {
    pool: Pool,
}

impl RedisJobQueue {
    pub async fn new(config: &AppConfig) -> Result<Self, JobQueueError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| JobQueueError::QueueError(format!("Pool creation error: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| JobQueueError::QueueError(format!("Connection error: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis job queue initialized successfully");

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, JobQueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| JobQueueError::QueueError(format!("Failed to get Redis connection: {}", e)))
    }

    async fn load(conn: &mut Connection, job_id: Uuid) -> Result<Option<Job>, JobQueueError> {
        let data: Option<String> = conn.hget(job_key(job_id), "data").await?;
        Ok(data.map(|d| serde_json::from_str::<Job>(&d)).transpose()?)
    }

    fn fields(job: &Job) -> Result<[(&'static str, String); 3], JobQueueError> {
        Ok([
            ("data", serde_json::to_string(job)?),
            ("status", job.status.to_string()),
            ("updated_at", job.updated_at.to_rfc3339()),
        ])
    }

    async fn store(conn: &mut Connection, job: &Job) -> Result<(), JobQueueError> {
        let key = job_key(job.job_id);
        let _: () = conn.hset_multiple(&key, &Self::fields(job)?).await?;
        let _: () = conn.expire(&key, JOB_TTL_SECONDS).await?;
        Ok(())
    }

    /// Stores the parked job, drops it from the processing list and adds it
    /// to the delayed set as one transaction.
    async fn park(conn: &mut Connection, job: &Job, ready_at: DateTime<Utc>) -> Result<(), JobQueueError> {
        let key = job_key(job.job_id);
        let id = job.job_id.to_string();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &Self::fields(job)?)
            .ignore()
            .expire(&key, JOB_TTL_SECONDS)
            .ignore()
            .lrem(PROCESSING_KEY, 1, &id)
            .ignore()
            .zadd(DELAYED_KEY, &id, ready_at.timestamp_millis())
            .ignore()
            .query_async(conn)
            .await?;
        Ok(())
    }

    async fn promote_due(conn: &mut Connection) -> Result<(), JobQueueError> {
        let promoted: u64 = Script::new(PROMOTE_DUE)
            .key(DELAYED_KEY)
            .key(PENDING_KEY)
            .arg(Utc::now().timestamp_millis())
            .invoke_async(conn)
            .await?;
        if promoted > 0 {
            debug!("Promoted {} parked jobs to pending", promoted);
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut conn = self.get_connection().await?;
        Self::store(&mut conn, job).await?;
        let _: () = conn.lpush(PENDING_KEY, job.job_id.to_string()).await?;

        debug!("Job {} enqueued successfully", job.job_id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<Job>, JobQueueError> {
        let mut conn = self.get_connection().await?;
        Self::promote_due(&mut conn).await?;

        let job_id: Option<String> = conn.brpoplpush(PENDING_KEY, PROCESSING_KEY, 1.0).await?;
        let Some(job_id) = job_id else {
            return Ok(None);
        };
        let job_id = Uuid::parse_str(&job_id)
            .map_err(|e| JobQueueError::QueueError(format!("Corrupt job id {}: {}", job_id, e)))?;

        let Some(mut job) = Self::load(&mut conn, job_id).await? else {
            // hash expired while the id was still listed
            let _: () = conn.lrem(PROCESSING_KEY, 1, job_id.to_string()).await?;
            return Ok(None);
        };

        apply_status(&mut job, JobStatus::Processing, None, None)?;
        job.worker_id = Some(worker_id.to_string());
        Self::store(&mut conn, &job).await?;

        debug!("Job {} dequeued by worker {}", job.job_id, worker_id);
        Ok(Some(job))
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        outcome: Option<JobOutcome>,
    ) -> Result<Job, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let mut job = Self::load(&mut conn, job_id)
            .await?
            .ok_or_else(|| JobQueueError::JobNotFound(job_id.to_string()))?;

        apply_status(&mut job, status, error_message, outcome)?;
        Self::store(&mut conn, &job).await?;

        if status != JobStatus::Processing {
            let _: () = conn.lrem(PROCESSING_KEY, 1, job_id.to_string()).await?;
        }
        if status.is_terminal() {
            let _: () = conn.incr(counter_key(status), 1).await?;
        }
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobQueueError> {
        let mut conn = self.get_connection().await?;
        Self::load(&mut conn, job_id).await
    }

    async fn schedule_retry(
        &self,
        job_id: Uuid,
        error_message: String,
        ready_at: DateTime<Utc>,
    ) -> Result<Job, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let mut job = Self::load(&mut conn, job_id)
            .await?
            .ok_or_else(|| JobQueueError::JobNotFound(job_id.to_string()))?;

        prepare_retry(&mut job, error_message)?;
        Self::park(&mut conn, &job, ready_at).await?;

        info!("Job {} parked for retry {}/{} until {}", job_id, job.retry_count, job.max_retries, ready_at);
        Ok(job)
    }

    async fn recover_stalled(&self, stalled_before: DateTime<Utc>) -> Result<u64, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let listed: Vec<String> = conn.lrange(PROCESSING_KEY, 0, -1).await?;

        let mut recovered = 0;
        for raw_id in listed {
            let job = match Uuid::parse_str(&raw_id) {
                Ok(job_id) => Self::load(&mut conn, job_id).await?,
                Err(_) => None,
            };
            let Some(mut job) = job else {
                let _: () = conn.lrem(PROCESSING_KEY, 1, &raw_id).await?;
                continue;
            };
            if !is_stalled(&job, stalled_before) {
                continue;
            }

            if job.can_retry() {
                prepare_retry(&mut job, STALLED_MESSAGE.to_string())?;
                Self::park(&mut conn, &job, Utc::now()).await?;
            } else {
                apply_status(&mut job, JobStatus::Failed, Some(STALLED_MESSAGE.to_string()), None)?;
                Self::store(&mut conn, &job).await?;
                let _: () = conn.lrem(PROCESSING_KEY, 1, &raw_id).await?;
                let _: () = conn.incr(counter_key(JobStatus::Failed), 1).await?;
            }
            warn!("Recovered job {} abandoned by worker {:?}", job.job_id, job.worker_id);
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let queued_jobs: u64 = conn.llen(PENDING_KEY).await?;
        let processing_jobs: u64 = conn.llen(PROCESSING_KEY).await?;
        let completed_jobs: Option<u64> = conn.get(counter_key(JobStatus::Completed)).await?;
        let failed_jobs: Option<u64> = conn.get(counter_key(JobStatus::Failed)).await?;
        let retrying_jobs: u64 = conn.zcard(DELAYED_KEY).await?;

        Ok(QueueStats {
            queued_jobs,
            processing_jobs,
            retrying_jobs,
            completed_jobs: completed_jobs.unwrap_or_default(),
            failed_jobs: failed_jobs.unwrap_or_default(),
        })
    }
}
