use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use shared_utils::Clock;

use crate::services::producer::JobProducerService;
use crate::JobKind;

/// Recurring fire times, all in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    DailyAt { hour: u32, minute: u32 },
    MonthlyAt { day: u32, hour: u32, minute: u32 },
}

impl Schedule {
    /// First fire time strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::DailyAt { hour, minute } => {
                let today = at(now.date_naive(), hour, minute)?;
                if today > now {
                    Some(today)
                } else {
                    at(now.date_naive() + ChronoDuration::days(1), hour, minute)
                }
            }
            Schedule::MonthlyAt { day, hour, minute } => {
                let (mut year, mut month) = (now.year(), now.month());
                // months shorter than `day` are skipped
                for _ in 0..=12 {
                    if let Some(candidate) = NaiveDate::from_ymd_opt(year, month, day)
                        .and_then(|date| at(date, hour, minute))
                    {
                        if candidate > now {
                            return Some(candidate);
                        }
                    }
                    if month == 12 {
                        year += 1;
                        month = 1;
                    } else {
                        month += 1;
                    }
                }
                None
            }
        }
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    date.and_hms_opt(hour, minute, 0).map(|dt| dt.and_utc())
}

/// Where to look for the next fire time. A timer that wakes before the
/// clock reaches `last_fired` must not see that instant as upcoming again.
fn resume_from(now: DateTime<Utc>, last_fired: Option<DateTime<Utc>>) -> DateTime<Utc> {
    last_fired.map_or(now, |fired| fired.max(now))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub schedule: Schedule,
    pub kind: JobKind,
}

/// Daily reminders at 08:00 and monthly reports on the 1st at 09:00.
pub fn default_schedule() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob {
            schedule: Schedule::DailyAt { hour: 8, minute: 0 },
            kind: JobKind::DailyReminders,
        },
        ScheduledJob {
            schedule: Schedule::MonthlyAt {
                day: 1,
                hour: 9,
                minute: 0,
            },
            kind: JobKind::MonthlyReports,
        },
    ]
}

/// Enqueues recurring jobs at their fire times until shut down.
pub struct JobScheduler {
    producer: Arc<JobProducerService>,
    clock: Arc<dyn Clock>,
    jobs: Vec<ScheduledJob>,
    shutdown: watch::Sender<bool>,
}

impl JobScheduler {
    pub fn new(producer: Arc<JobProducerService>, clock: Arc<dyn Clock>, jobs: Vec<ScheduledJob>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            producer,
            clock,
            jobs,
            shutdown,
        }
    }

    /// The earliest upcoming fire time and every job due at that instant.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<JobKind>)> {
        let upcoming: Vec<(DateTime<Utc>, &JobKind)> = self
            .jobs
            .iter()
            .filter_map(|job| job.schedule.next_run_after(now).map(|at| (at, &job.kind)))
            .collect();
        let earliest = upcoming.iter().map(|(at, _)| *at).min()?;
        let kinds = upcoming
            .into_iter()
            .filter(|(at, _)| *at == earliest)
            .map(|(_, kind)| kind.clone())
            .collect();
        Some((earliest, kinds))
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        info!("Job scheduler started with {} recurring jobs", self.jobs.len());

        let mut last_fired = None;
        while !*shutdown.borrow() {
            let now = self.clock.now();
            let Some((fire_at, kinds)) = self.next_due(resume_from(now, last_fired)) else {
                info!("No upcoming scheduled jobs, scheduler stopping");
                return;
            };
            let wait = (fire_at - now).to_std().unwrap_or_default();
            debug!("Next scheduled run at {} ({:?})", fire_at, kinds);

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            for kind in kinds {
                if let Err(e) = self.producer.enqueue_kind(kind.clone()).await {
                    error!("Failed to enqueue scheduled {} job: {}", kind.name(), e);
                }
            }
            last_fired = Some(fire_at);
        }

        info!("Job scheduler stopped");
    }
}
