use std::sync::Arc;
use tracing::{info, warn};

use admin_cell::AdminService;
use cache_cell::{CacheBackend, DirectoryCache, InMemoryCache, RedisCache};
use job_queue_cell::{
    default_schedule, HttpMailer, InMemoryJobQueue, JobProducerService, JobQueue, JobScheduler,
    JobWorkerService, LogMailer, Mailer, RedisJobQueue, TaskRunner, WorkerConfig,
};
use shared_config::AppConfig;
use shared_database::{InMemoryRecordStore, RecordStore, SupabaseClient, SupabaseRecordStore};
use shared_utils::{Clock, SystemClock};

/// Long-lived services of the worker process.
pub struct Clinic {
    pub admin: AdminService,
    pub worker: JobWorkerService,
    pub scheduler: Arc<JobScheduler>,
}

impl Clinic {
    /// Builds every backend from config, falling back to in-process
    /// implementations for anything left unconfigured.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let store = record_store(config);
        let cache = Arc::new(DirectoryCache::new(cache_backend(config).await, Arc::clone(&store)));
        let queue = job_queue(config).await;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let producer = Arc::new(JobProducerService::new(Arc::clone(&queue)));
        let runner = Arc::new(TaskRunner::new(
            Arc::clone(&store),
            mailer(config),
            Arc::clone(&clock),
            config.export_dir.clone(),
        ));

        let worker_config = WorkerConfig {
            concurrency: config.worker_concurrency,
            job_timeout_seconds: config.job_timeout_seconds,
            ..WorkerConfig::default()
        };

        Ok(Self {
            admin: AdminService::new(Arc::clone(&store), cache),
            worker: JobWorkerService::new(worker_config, queue, runner),
            scheduler: Arc::new(JobScheduler::new(producer, clock, default_schedule())),
        })
    }
}

fn record_store(config: &AppConfig) -> Arc<dyn RecordStore> {
    if config.is_configured() {
        info!("Using Supabase record store at {}", config.supabase_url);
        Arc::new(SupabaseRecordStore::new(Arc::new(SupabaseClient::new(config))))
    } else {
        warn!("Supabase not configured, records are kept in memory only");
        Arc::new(InMemoryRecordStore::new())
    }
}

async fn cache_backend(config: &AppConfig) -> Arc<dyn CacheBackend> {
    if config.is_redis_configured() {
        match RedisCache::new(config).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => warn!("Redis cache unavailable, using in-process cache: {}", e),
        }
    }
    Arc::new(InMemoryCache::new())
}

async fn job_queue(config: &AppConfig) -> Arc<dyn JobQueue> {
    if config.is_redis_configured() {
        match RedisJobQueue::new(config).await {
            Ok(queue) => return Arc::new(queue),
            Err(e) => warn!("Redis job queue unavailable, using in-process queue: {}", e),
        }
    }
    Arc::new(InMemoryJobQueue::new())
}

fn mailer(config: &AppConfig) -> Arc<dyn Mailer> {
    if config.is_mail_configured() {
        Arc::new(HttpMailer::new(config))
    } else {
        Arc::new(LogMailer)
    }
}
