//! Schedule synchronizer: keeps scheduled delivery jobs consistent
//! with both the content lifecycle and the notification record
//! lifecycle, without ever double-scheduling.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pressline_core::commands::ContentEvent;
use pressline_core::error::Result;
use pressline_core::traits::SearchIndex;
use pressline_core::types::{
    ContentItem, ContentStatus, Notification, NotificationKind, NotificationQuery, SyncOperation,
};

use crate::service::NotificationService;

// ─── Job planning ──────────────────────────────────────

/// What to do with the pending job for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    /// Encoded `send_at` unchanged: leave the pending job alone.
    Keep,
    /// `send_at` newly absent (or record terminal): remove the job.
    Cancel,
    /// (Re)create the job at this time, replacing any pending one
    /// under the same key.
    Schedule(DateTime<Utc>),
}

/// Pure decision logic for record-event job maintenance.
#[derive(Debug, Clone, Copy)]
pub struct JobPlanner {
    min_lead: Duration,
}

impl JobPlanner {
    pub fn new(min_lead_secs: i64) -> Self {
        Self {
            min_lead: Duration::seconds(min_lead_secs),
        }
    }

    /// Compare the previous and current encoded `send_at` values
    /// (exact equality, including "absent") and plan the job change.
    /// Targets in the past are clamped forward so the scheduler never
    /// rejects the timestamp.
    pub fn plan(
        &self,
        previous_send_at: Option<DateTime<Utc>>,
        record: &Notification,
        now: DateTime<Utc>,
    ) -> JobAction {
        let current = if record.is_terminal() {
            None
        } else {
            record.send_at
        };

        let encode = |t: Option<DateTime<Utc>>| t.map(|t| t.to_rfc3339());
        if encode(previous_send_at) == encode(current) {
            return JobAction::Keep;
        }
        match current {
            None => JobAction::Cancel,
            Some(at) => JobAction::Schedule(at.max(now + self.min_lead)),
        }
    }
}

/// Target delivery time implied by a content item's publish state:
/// publish time plus the configured delay while the content is (or will
/// be) live, absent otherwise.
pub(crate) fn publish_send_at(item: &ContentItem, delay: Duration) -> Option<DateTime<Utc>> {
    match item.status {
        ContentStatus::Published => {
            Some(item.published_at.unwrap_or_else(Utc::now) + delay)
        }
        ContentStatus::Scheduled => item.publish_at.map(|t| t + delay),
        _ => None,
    }
}

// ─── Content fan-out ──────────────────────────────────────

/// Watches content lifecycle events and re-targets every bound,
/// not-yet-sent, send-on-publish notification.
pub struct ScheduleSynchronizer {
    service: Arc<NotificationService>,
    index: Arc<dyn SearchIndex>,
    publish_delay: Duration,
}

impl ScheduleSynchronizer {
    pub fn new(
        service: Arc<NotificationService>,
        index: Arc<dyn SearchIndex>,
        publish_delay_secs: i64,
    ) -> Self {
        Self {
            service,
            index,
            publish_delay: Duration::seconds(publish_delay_secs),
        }
    }

    /// React to one content lifecycle transition. Returns the number of
    /// record updates issued. Replayed events are an idempotent no-op.
    pub async fn handle_content_event(&self, event: &ContentEvent) -> Result<u32> {
        if event.is_replay {
            tracing::debug!(
                "Replayed content event for {}, skipping side effects",
                event.item.reference
            );
            return Ok(0);
        }
        if !event.item.has_notifications {
            return Ok(0);
        }
        tracing::info!(
            "🔔 Content {} {:?}, syncing bound notifications",
            event.item.reference,
            event.transition
        );

        let desired_at = publish_send_at(&event.item, self.publish_delay);
        let mut updated = 0u32;

        // Paged by creation time ascending, re-queried until exhausted,
        // so large fan-outs never load everything at once.
        let mut query = NotificationQuery::for_content(&event.item.reference);
        loop {
            let page = self.index.query(&query).await?;
            if page.items.is_empty() {
                break;
            }
            let exhausted = page.items.len() < query.limit;
            for record in page.items {
                if !Self::wants_content_sync(&record) {
                    continue;
                }
                if record.send_at == desired_at && record.title == event.item.title {
                    continue;
                }
                let mut changed = record;
                changed.send_at = desired_at;
                changed.title = event.item.title.clone();
                self.service.update(changed, event.is_replay).await?;
                updated += 1;
            }
            if exhausted {
                break;
            }
            query = query.next_page();
        }
        Ok(updated)
    }

    /// Whether the generic fan-out loop owns this record. Syndication
    /// records with a document operation (create/update/delete) are
    /// driven by the content-specific watcher; touching them here would
    /// double-deliver.
    fn wants_content_sync(record: &Notification) -> bool {
        if record.is_terminal() || !record.send_on_publish {
            return false;
        }
        if record.kind == NotificationKind::Syndication
            && record.operation != SyncOperation::Notify
        {
            return false;
        }
        true
    }
}
