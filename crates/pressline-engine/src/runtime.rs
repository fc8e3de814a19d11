//! In-process job substrate.
//!
//! A keyed timer queue ticked by a tokio interval loop, for standalone
//! deployments that run without an external scheduling substrate. Keyed
//! insert replaces, so the at-most-one-pending-job-per-record property
//! holds here exactly as it does against the external substrate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pressline_core::commands::Command;
use pressline_core::error::Result;
use pressline_core::traits::{JobScheduler, SearchIndex};
use pressline_core::types::{NotificationQuery, SendStatus};

use crate::dispatch::Dispatcher;
use crate::service::NotificationService;
use crate::sync::{JobAction, JobPlanner};

struct QueuedJob {
    command: Command,
    at: DateTime<Utc>,
}

/// Timer-queue scheduler ticked from [`spawn_delivery_loop`].
#[derive(Default)]
pub struct TickScheduler {
    jobs: Mutex<HashMap<String, QueuedJob>>,
    immediate: Mutex<Vec<Command>>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop everything due at `now`, immediate commands first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Command> {
        let mut due: Vec<Command> = self.immediate.lock().unwrap().drain(..).collect();

        let mut jobs = self.jobs.lock().unwrap();
        let keys: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(job) = jobs.remove(&key) {
                due.push(job.command);
            }
        }
        due
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobScheduler for TickScheduler {
    async fn schedule_at(&self, command: Command, at: DateTime<Utc>, key: &str) -> Result<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(key.to_string(), QueuedJob { command, at });
        Ok(())
    }

    async fn cancel(&self, keys: &[String]) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        for key in keys {
            jobs.remove(key);
        }
        Ok(())
    }

    async fn send_now(&self, command: Command) -> Result<()> {
        self.immediate.lock().unwrap().push(command);
        Ok(())
    }
}

/// Rebuild the timer queue from persisted state after a restart: every
/// Scheduled record gets its delivery job back, overdue targets clamped
/// forward by the planner. Returns the number of jobs placed.
pub async fn recover_jobs(
    index: &dyn SearchIndex,
    scheduler: &dyn JobScheduler,
    planner: &JobPlanner,
) -> Result<u32> {
    let now = Utc::now();
    let mut recovered = 0u32;
    let mut query = NotificationQuery {
        status: Some(SendStatus::Scheduled),
        limit: 50,
        ..Default::default()
    };
    loop {
        let page = index.query(&query).await?;
        if page.items.is_empty() {
            break;
        }
        let exhausted = page.items.len() < query.limit;
        for record in page.items {
            if let JobAction::Schedule(at) = planner.plan(None, &record, now) {
                scheduler
                    .schedule_at(
                        Command::SendNotification(
                            pressline_core::commands::SendNotification::new(&record.id),
                        ),
                        at,
                        &record.job_key(),
                    )
                    .await?;
                recovered += 1;
            }
        }
        if exhausted {
            break;
        }
        query = query.next_page();
    }
    if recovered > 0 {
        tracing::info!("🔁 Recovered {recovered} pending delivery jobs");
    }
    Ok(recovered)
}

/// Drain and execute everything currently due. Delivery commands go to
/// the dispatcher, record commands to the service. A failing command is
/// logged and never takes the loop down.
pub async fn run_due(
    scheduler: &TickScheduler,
    dispatcher: &Dispatcher,
    service: &NotificationService,
) -> u32 {
    let mut handled = 0u32;
    for command in scheduler.due(Utc::now()) {
        handled += 1;
        match command {
            Command::SendNotification(send) => {
                if let Err(e) = dispatcher.handle(&send, false).await {
                    tracing::warn!("⚠️ Delivery of {} errored: {e}", send.reference);
                }
            }
            other => {
                if let Err(e) = service.handle_command(other, false).await {
                    tracing::warn!("⚠️ Queued command errored: {e}");
                }
            }
        }
    }
    handled
}

/// Run the delivery loop until the process exits.
pub async fn spawn_delivery_loop(
    scheduler: Arc<TickScheduler>,
    dispatcher: Arc<Dispatcher>,
    service: Arc<NotificationService>,
    check_interval_secs: u64,
) {
    tracing::info!("⏰ Delivery loop started (check every {check_interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));
    loop {
        interval.tick().await;
        run_due(&scheduler, &dispatcher, &service).await;
    }
}
