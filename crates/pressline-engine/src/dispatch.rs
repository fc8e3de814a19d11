//! Fire-time dispatcher.
//!
//! Runs when a scheduled delivery job fires: re-reads the record,
//! re-checks every precondition against current state (the world has
//! moved since scheduling), makes exactly one delivery attempt through
//! the backend registry, and classifies the outcome into commit-sent,
//! commit-failed, or reschedule-with-backoff. Exactly one side effect
//! per invocation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pressline_core::commands::{Command, NotificationEvent, SendNotification};
use pressline_core::config::{PresslineConfig, RetryConfig};
use pressline_core::error::{PresslineError, Result};
use pressline_core::naming::Naming;
use pressline_core::traits::{
    ChannelStore, ContentStore, JobScheduler, NotificationStore, SearchIndex,
};
use pressline_core::types::{
    ContentItem, Notification, NotificationKind, NotifierResult, OutcomeCode, SendStatus,
    SyncOperation,
};
use pressline_notifiers::NotifierRegistry;

use crate::record;

/// What one dispatcher invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Replayed job, nothing done.
    Replay,
    /// The record is gone or no longer Scheduled; the job is obsolete.
    Stale,
    /// Transient failure, another attempt is pending.
    Rescheduled {
        attempt: u32,
        at: DateTime<Utc>,
    },
    Sent(NotificationEvent),
    Failed(NotificationEvent),
}

pub struct Dispatcher {
    naming: Naming,
    retry: RetryConfig,
    store: Arc<dyn NotificationStore>,
    index: Arc<dyn SearchIndex>,
    channels: Arc<dyn ChannelStore>,
    content: Arc<dyn ContentStore>,
    scheduler: Arc<dyn JobScheduler>,
    registry: Arc<NotifierRegistry>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &PresslineConfig,
        store: Arc<dyn NotificationStore>,
        index: Arc<dyn SearchIndex>,
        channels: Arc<dyn ChannelStore>,
        content: Arc<dyn ContentStore>,
        scheduler: Arc<dyn JobScheduler>,
        registry: Arc<NotifierRegistry>,
    ) -> Self {
        Self {
            naming: config.naming.clone(),
            retry: config.retry.clone(),
            store,
            index,
            channels,
            content,
            scheduler,
            registry,
        }
    }

    /// Handle one fired delivery job.
    pub async fn handle(
        &self,
        command: &SendNotification,
        is_replay: bool,
    ) -> Result<DispatchOutcome> {
        if is_replay {
            tracing::debug!("Replayed send of {}, skipping", command.reference);
            return Ok(DispatchOutcome::Replay);
        }

        // The scheduler is at-least-once and the record may have moved
        // on since the job was placed. Anything not currently Scheduled
        // makes the job obsolete, not an error.
        let Some(record) = self.store.get(&command.reference).await? else {
            tracing::info!("Job fired for missing notification {}", command.reference);
            return Ok(DispatchOutcome::Stale);
        };
        if record.send_status != SendStatus::Scheduled {
            tracing::info!(
                "Job fired for notification {} in {:?}, ignoring",
                record.id,
                record.send_status
            );
            return Ok(DispatchOutcome::Stale);
        }

        let channel = self.channels.get(&record.channel_ref).await?;
        let content = match &record.content_ref {
            Some(reference) => self.content.get(reference).await?,
            None => None,
        };

        let result = match self.check_preconditions(&record, channel.as_ref(), content.as_ref()) {
            Some(blocked) => blocked,
            None => {
                // channel is Some past the precondition check
                let channel = channel.as_ref().ok_or_else(|| {
                    PresslineError::NotFound(record.channel_ref.clone())
                })?;
                self.registry
                    .dispatch(&record, channel, content.as_ref())
                    .await
            }
        };

        self.classify(record, command, result).await
    }

    /// Fire-time checks. A `Some` return is the attempt's result; the
    /// backend is never invoked.
    fn check_preconditions(
        &self,
        record: &Notification,
        channel: Option<&pressline_core::types::Channel>,
        content: Option<&ContentItem>,
    ) -> Option<NotifierResult> {
        let Some(channel) = channel else {
            return Some(NotifierResult::failure(
                OutcomeCode::NotFound,
                "ChannelMissing",
                &format!("channel {} no longer exists", record.channel_ref),
            ));
        };
        if !self.naming.matches(record.kind, &channel.channel_type) {
            return Some(NotifierResult::failure(
                OutcomeCode::NotFound,
                "ChannelMismatch",
                &format!(
                    "channel {} has type '{}', expected '{}'",
                    channel.reference,
                    channel.channel_type,
                    self.naming.channel_type(record.kind)
                ),
            ));
        }

        let Some(content_ref) = &record.content_ref else {
            return None;
        };
        // A syndication delete must go through even when the content is
        // already gone or withdrawn; that is the whole point of it.
        let delete_exempt = record.kind == NotificationKind::Syndication
            && record.operation == SyncOperation::Delete;

        match content {
            None if delete_exempt => None,
            None => Some(NotifierResult::failure(
                OutcomeCode::NotFound,
                "ContentMissing",
                &format!("content {content_ref} no longer exists"),
            )),
            Some(item) if !item.has_notifications => Some(NotifierResult::failure(
                OutcomeCode::InvalidArgument,
                "ContentUnnotifiable",
                &format!("content {content_ref} does not participate in notifications"),
            )),
            Some(item) if !item.is_published() && !delete_exempt => {
                // Retryable on purpose: a scheduled publish may land
                // before the retry budget runs out.
                Some(NotifierResult::failure(
                    OutcomeCode::Aborted,
                    "ContentNotPublished",
                    &format!("content {content_ref} is {:?}", item.status),
                ))
            }
            Some(_) => None,
        }
    }

    /// Commit the attempt's outcome: sent, failed, or one more try.
    async fn classify(
        &self,
        record: Notification,
        command: &SendNotification,
        result: NotifierResult,
    ) -> Result<DispatchOutcome> {
        let now = Utc::now();

        if !result.ok
            && result.code.is_retryable()
            && command.retry_count < self.retry.max_attempts
        {
            let next = command.retry();
            let at = now + Duration::seconds(self.retry.backoff_step_secs) * next.retry_count as i32;
            tracing::warn!(
                "🔁 Delivery of {} failed ({:?}), retry {}/{} at {at}",
                record.id,
                result.code,
                next.retry_count,
                self.retry.max_attempts
            );
            let attempt = next.retry_count;
            self.scheduler
                .schedule_at(Command::SendNotification(next), at, &record.job_key())
                .await?;
            return Ok(DispatchOutcome::Rescheduled { attempt, at });
        }

        if result.ok {
            let sent = record::mark_sent(&record, result.clone(), now)?;
            self.commit(sent.clone(), record.version).await?;
            tracing::info!("✅ Notification {} sent via {}", sent.id, sent.kind);
            return Ok(DispatchOutcome::Sent(NotificationEvent::Sent {
                record: sent,
                result,
            }));
        }

        let failed = record::mark_failed(&record, result.clone(), now)?;
        self.commit(failed.clone(), record.version).await?;
        tracing::warn!(
            "⚠️ Notification {} failed terminally: {:?} {}",
            failed.id,
            result.code,
            result.error_name.as_deref().unwrap_or("-")
        );
        Ok(DispatchOutcome::Failed(NotificationEvent::Failed {
            record: failed,
            result,
        }))
    }

    async fn commit(&self, mut record: Notification, expected_version: u64) -> Result<()> {
        self.store.update(&record, expected_version).await?;
        record.version = expected_version + 1;
        self.index.index(&record).await
    }
}
