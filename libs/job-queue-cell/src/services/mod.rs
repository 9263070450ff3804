pub mod mailer;
pub mod producer;
pub mod queue;
pub mod redis_queue;
pub mod scheduler;
pub mod tasks;
pub mod worker;

pub use mailer::{HttpMailer, LogMailer, Mailer};
pub use producer::JobProducerService;
pub use queue::{InMemoryJobQueue, JobQueue};
pub use redis_queue::RedisJobQueue;
pub use scheduler::{default_schedule, JobScheduler, Schedule, ScheduledJob};
pub use tasks::{export_file_name, previous_month, TaskRunner};
pub use worker::JobWorkerService;

#[cfg(any(test, feature = "mocks"))]
pub use mailer::MockMailer;
#[cfg(any(test, feature = "mocks"))]
pub use queue::MockJobQueue;
