//! Record lifecycle service.
//!
//! Owns the create/update/delete paths: validation against the channel,
//! the duplicate-schedule check, versioned store commits, index
//! maintenance, and job upkeep through the [`JobPlanner`]. Every write
//! leaves the store, the index, and the scheduler agreeing with each
//! other.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pressline_core::commands::{Command, NotificationEvent, SendNotification};
use pressline_core::config::PresslineConfig;
use pressline_core::error::{PresslineError, Result};
use pressline_core::naming::Naming;
use pressline_core::traits::{
    ChannelStore, ContentStore, JobScheduler, NotificationStore, SearchIndex,
};
use pressline_core::types::{Channel, Notification, NotificationQuery, SendStatus};

use crate::record;
use crate::sync::{publish_send_at, JobAction, JobPlanner};

pub struct NotificationService {
    naming: Naming,
    planner: JobPlanner,
    publish_delay: Duration,
    store: Arc<dyn NotificationStore>,
    index: Arc<dyn SearchIndex>,
    channels: Arc<dyn ChannelStore>,
    contents: Arc<dyn ContentStore>,
    scheduler: Arc<dyn JobScheduler>,
}

impl NotificationService {
    pub fn new(
        config: &PresslineConfig,
        store: Arc<dyn NotificationStore>,
        index: Arc<dyn SearchIndex>,
        channels: Arc<dyn ChannelStore>,
        contents: Arc<dyn ContentStore>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        Self {
            naming: config.naming.clone(),
            planner: JobPlanner::new(config.scheduler.min_lead_secs),
            publish_delay: Duration::seconds(config.publish_delay_secs),
            store,
            index,
            channels,
            contents,
            scheduler,
        }
    }

    /// Route one record command. Delivery commands belong to the
    /// dispatcher, not here.
    pub async fn handle_command(
        &self,
        command: Command,
        is_replay: bool,
    ) -> Result<Option<NotificationEvent>> {
        match command {
            Command::CreateNotification { record } => {
                Ok(Some(self.create(record, is_replay).await?))
            }
            Command::UpdateNotification { record } => {
                Ok(Some(self.update(record, is_replay).await?))
            }
            Command::DeleteNotification { reference } => {
                self.delete(&reference, is_replay).await?;
                Ok(None)
            }
            Command::SendNotification(_) => Err(PresslineError::Validation(
                "send_notification is a dispatcher command".into(),
            )),
        }
    }

    /// Validate and persist a new record, then bring its delivery job
    /// in line with its `send_at`. A send-on-publish record created
    /// against content that is already live (or has a publish time)
    /// gets its `send_at` filled in here; the synchronizer only sees
    /// publish events that happen after the record exists.
    pub async fn create(
        &self,
        mut record: Notification,
        is_replay: bool,
    ) -> Result<NotificationEvent> {
        if record.send_at.is_none() {
            record.send_at = self.content_send_at(&record).await?;
        }
        let channel = self.channel_for(&record).await?;
        let peers = self.scheduled_peers(&record).await?;
        record::validate_create(&record, &channel, &self.naming, &peers)?;

        let record = record::prepare_create(record);
        self.store.insert(&record).await?;
        self.index.index(&record).await?;

        if !is_replay {
            self.apply_job_plan(None, &record).await?;
        }
        tracing::info!(
            "✅ Created {} notification {} ({:?})",
            record.kind,
            record.id,
            record.send_status
        );
        Ok(NotificationEvent::Created { record })
    }

    /// Apply an update on top of the stored record. The commit names
    /// the version it read; a concurrent writer surfaces as
    /// [`PresslineError::VersionConflict`] instead of a silent
    /// overwrite.
    pub async fn update(
        &self,
        mut record: Notification,
        is_replay: bool,
    ) -> Result<NotificationEvent> {
        if record.send_at.is_none() {
            record.send_at = self.content_send_at(&record).await?;
        }
        let old = self
            .store
            .get(&record.id)
            .await?
            .ok_or_else(|| PresslineError::NotFound(record.id.clone()))?;
        let channel = self.channel_for(&record).await?;
        record::validate_channel_match(&record, &channel, &self.naming)?;

        let mut prepared = record::prepare_update(&old, record)?;
        self.store.update(&prepared, old.version).await?;
        prepared.version = old.version + 1;
        self.index.index(&prepared).await?;

        if !is_replay {
            self.apply_job_plan(old.send_at, &prepared).await?;
        }
        tracing::info!(
            "✅ Updated notification {} ({:?} → {:?})",
            prepared.id,
            old.send_status,
            prepared.send_status
        );
        Ok(NotificationEvent::Updated {
            previous: old,
            record: prepared,
        })
    }

    /// Remove a record. Anything not yet Sent/Failed leaves as
    /// Canceled; its pending job is removed unconditionally.
    pub async fn delete(&self, reference: &str, is_replay: bool) -> Result<Option<Notification>> {
        let Some(old) = self.store.get(reference).await? else {
            return Ok(None);
        };
        let deleted = record::prepare_delete(&old);
        self.store.delete(reference).await?;
        self.index.delete(reference).await?;

        if !is_replay {
            self.scheduler.cancel(&[old.job_key()]).await?;
        }
        tracing::info!(
            "🗑️ Deleted notification {} ({:?})",
            deleted.id,
            deleted.send_status
        );
        Ok(Some(deleted))
    }

    /// `send_at` implied by the bound content's publish state, for
    /// send-on-publish records written without an explicit time.
    async fn content_send_at(&self, record: &Notification) -> Result<Option<DateTime<Utc>>> {
        if !record.send_on_publish {
            return Ok(None);
        }
        let Some(content_ref) = &record.content_ref else {
            return Ok(None);
        };
        let Some(item) = self.contents.get(content_ref).await? else {
            return Ok(None);
        };
        Ok(publish_send_at(&item, self.publish_delay))
    }

    async fn channel_for(&self, record: &Notification) -> Result<Channel> {
        self.channels
            .get(&record.channel_ref)
            .await?
            .ok_or_else(|| PresslineError::NotFound(record.channel_ref.clone()))
    }

    /// Other Scheduled records on the same (channel, content) pair. Only
    /// consulted for send-on-publish records bound to content.
    async fn scheduled_peers(&self, record: &Notification) -> Result<Vec<Notification>> {
        let Some(content_ref) = &record.content_ref else {
            return Ok(Vec::new());
        };
        if !record.send_on_publish {
            return Ok(Vec::new());
        }
        let query = NotificationQuery::for_content(content_ref)
            .with_channel(&record.channel_ref)
            .with_status(SendStatus::Scheduled);
        Ok(self.index.query(&query).await?.items)
    }

    async fn apply_job_plan(
        &self,
        previous_send_at: Option<chrono::DateTime<Utc>>,
        record: &Notification,
    ) -> Result<()> {
        match self.planner.plan(previous_send_at, record, Utc::now()) {
            JobAction::Keep => Ok(()),
            JobAction::Cancel => {
                tracing::debug!("Canceling delivery job {}", record.job_key());
                self.scheduler.cancel(&[record.job_key()]).await
            }
            JobAction::Schedule(at) => {
                tracing::debug!("Scheduling delivery job {} at {at}", record.job_key());
                self.scheduler
                    .schedule_at(
                        Command::SendNotification(SendNotification::new(&record.id)),
                        at,
                        &record.job_key(),
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pressline_core::types::{
        ContentItem, ContentStatus, NotificationKind, NotifierResult, OutcomeCode,
    };
    use pressline_store::{
        MemoryChannelStore, MemoryContentStore, MemoryNotificationStore, MemorySearchIndex,
        RecordingScheduler,
    };

    struct Fixture {
        service: NotificationService,
        store: Arc<MemoryNotificationStore>,
        index: Arc<MemorySearchIndex>,
        contents: Arc<MemoryContentStore>,
        scheduler: Arc<RecordingScheduler>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryNotificationStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let channels = Arc::new(MemoryChannelStore::new());
        channels.put(Channel::new("ch", "pressline-push-app", serde_json::json!({})));
        let contents = Arc::new(MemoryContentStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let service = NotificationService::new(
            &PresslineConfig::default(),
            store.clone(),
            index.clone(),
            channels,
            contents.clone(),
            scheduler.clone(),
        );
        Fixture {
            service,
            store,
            index,
            contents,
            scheduler,
        }
    }

    fn push_record() -> Notification {
        Notification::new(NotificationKind::Push, "ch", "t", "b")
    }

    #[tokio::test]
    async fn test_create_draft_has_no_job() {
        let f = fixture();
        let event = f.service.create(push_record(), false).await.unwrap();
        assert_eq!(event.record().send_status, SendStatus::Draft);
        assert_eq!(f.scheduler.pending_count(), 0);
        assert!(f.store.get(&event.record().id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_scheduled_places_job() {
        let f = fixture();
        let at = Utc::now() + Duration::seconds(600);
        let event = f
            .service
            .create(push_record().with_send_at(at), false)
            .await
            .unwrap();
        assert_eq!(event.record().send_status, SendStatus::Scheduled);
        let job = f.scheduler.pending_job(&event.record().job_key()).unwrap();
        assert_eq!(job.at, at);
    }

    #[tokio::test]
    async fn test_create_past_send_at_clamped_forward() {
        let f = fixture();
        let now = Utc::now();
        let event = f
            .service
            .create(push_record().with_send_at(now - Duration::seconds(300)), false)
            .await
            .unwrap();
        let job = f.scheduler.pending_job(&event.record().job_key()).unwrap();
        assert!(job.at >= now + Duration::seconds(4));
    }

    #[tokio::test]
    async fn test_create_replay_skips_scheduler() {
        let f = fixture();
        let at = Utc::now() + Duration::seconds(600);
        f.service
            .create(push_record().with_send_at(at), true)
            .await
            .unwrap();
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_create_against_published_content_schedules() {
        let f = fixture();
        let published_at = Utc::now() - Duration::seconds(60);
        let mut item = ContentItem::new("article-1", "Title", ContentStatus::Published);
        item.published_at = Some(published_at);
        f.contents.put(item);

        let event = f
            .service
            .create(push_record().with_content("article-1", true), false)
            .await
            .unwrap();
        // The publish happened before the record existed, so no content
        // event will ever retarget it; send_at derives at create time.
        assert_eq!(
            event.record().send_at,
            Some(published_at + Duration::seconds(10))
        );
        assert_eq!(event.record().send_status, SendStatus::Scheduled);
        assert_eq!(f.scheduler.pending_count(), 1);
        let job = f.scheduler.pending_job(&event.record().job_key()).unwrap();
        // Target was already past, so the job is clamped forward.
        assert!(job.at > published_at + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_create_against_publish_scheduled_content_schedules() {
        let f = fixture();
        let publish_at = Utc::now() + Duration::seconds(3600);
        let mut item = ContentItem::new("article-1", "Title", ContentStatus::Scheduled);
        item.publish_at = Some(publish_at);
        f.contents.put(item);

        let event = f
            .service
            .create(push_record().with_content("article-1", true), false)
            .await
            .unwrap();
        let job = f.scheduler.pending_job(&event.record().job_key()).unwrap();
        assert_eq!(job.at, publish_at + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_create_against_unpublished_content_stays_draft() {
        let f = fixture();
        f.contents
            .put(ContentItem::new("article-1", "Title", ContentStatus::Draft));

        let event = f
            .service
            .create(push_record().with_content("article-1", true), false)
            .await
            .unwrap();
        assert_eq!(event.record().send_status, SendStatus::Draft);
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_update_rederives_send_at_after_publish() {
        let f = fixture();
        let event = f
            .service
            .create(push_record().with_content("article-1", true), false)
            .await
            .unwrap();
        assert_eq!(event.record().send_status, SendStatus::Draft);

        let published_at = Utc::now() + Duration::seconds(600);
        let mut item = ContentItem::new("article-1", "Title", ContentStatus::Published);
        item.published_at = Some(published_at);
        f.contents.put(item);

        let updated = f
            .service
            .update(event.record().clone(), false)
            .await
            .unwrap();
        assert_eq!(updated.record().send_status, SendStatus::Scheduled);
        let job = f.scheduler.pending_job(&updated.record().job_key()).unwrap();
        assert_eq!(job.at, published_at + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_create_unknown_channel_rejected() {
        let f = fixture();
        let record = Notification::new(NotificationKind::Push, "ghost", "t", "b");
        assert!(matches!(
            f.service.create(record, false).await,
            Err(PresslineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_kind_mismatch_rejected() {
        let f = fixture();
        let record = Notification::new(NotificationKind::Email, "ch", "t", "b");
        assert!(matches!(
            f.service.create(record, false).await,
            Err(PresslineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_schedule_rejected() {
        let f = fixture();
        let first = push_record()
            .with_content("article-1", true)
            .with_send_at(Utc::now() + Duration::seconds(60));
        f.service.create(first, false).await.unwrap();

        let second = push_record()
            .with_content("article-1", true)
            .with_send_at(Utc::now() + Duration::seconds(120));
        let err = f.service.create(second, false).await.unwrap_err();
        assert!(err.to_string().contains("already scheduled"));
        assert_eq!(f.scheduler.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_update_reschedules_under_same_key() {
        let f = fixture();
        let first_at = Utc::now() + Duration::seconds(600);
        let event = f
            .service
            .create(push_record().with_send_at(first_at), false)
            .await
            .unwrap();

        let second_at = Utc::now() + Duration::seconds(1200);
        let mut changed = event.record().clone();
        changed.send_at = Some(second_at);
        let updated = f.service.update(changed, false).await.unwrap();

        // At most one pending job per record, later schedule wins.
        assert_eq!(f.scheduler.pending_count(), 1);
        let job = f.scheduler.pending_job(&updated.record().job_key()).unwrap();
        assert_eq!(job.at, second_at);
        assert_eq!(updated.record().version, 1);
    }

    #[tokio::test]
    async fn test_update_clearing_send_at_cancels() {
        let f = fixture();
        let event = f
            .service
            .create(
                push_record().with_send_at(Utc::now() + Duration::seconds(600)),
                false,
            )
            .await
            .unwrap();

        let mut changed = event.record().clone();
        changed.send_at = None;
        let updated = f.service.update(changed, false).await.unwrap();
        assert_eq!(updated.record().send_status, SendStatus::Draft);
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_update_unchanged_send_at_keeps_job() {
        let f = fixture();
        let at = Utc::now() + Duration::seconds(600);
        let event = f
            .service
            .create(push_record().with_send_at(at), false)
            .await
            .unwrap();

        let mut changed = event.record().clone();
        changed.title = "new title".into();
        f.service.update(changed, false).await.unwrap();
        assert_eq!(f.scheduler.pending_count(), 1);
        assert_eq!(f.scheduler.canceled_keys().len(), 0);
    }

    #[tokio::test]
    async fn test_update_terminal_record_is_fatal() {
        let f = fixture();
        let mut sent = record::prepare_create(push_record());
        sent.send_status = SendStatus::Sent;
        sent.sent_at = Some(Utc::now());
        sent.result = Some(NotifierResult::success(OutcomeCode::Ok));
        f.store.insert(&sent).await.unwrap();
        f.index.index(&sent).await.unwrap();

        let err = f.service.update(sent.clone(), false).await.unwrap_err();
        assert!(err.is_terminal_guard());
    }

    #[tokio::test]
    async fn test_delete_cancels_and_returns_canceled() {
        let f = fixture();
        let event = f
            .service
            .create(
                push_record().with_send_at(Utc::now() + Duration::seconds(600)),
                false,
            )
            .await
            .unwrap();
        let reference = event.record().id.clone();

        let deleted = f.service.delete(&reference, false).await.unwrap().unwrap();
        assert_eq!(deleted.send_status, SendStatus::Canceled);
        assert_eq!(f.scheduler.pending_count(), 0);
        assert!(f.store.get(&reference).await.unwrap().is_none());
        assert!(f
            .scheduler
            .canceled_keys()
            .contains(&format!("{reference}.send")));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let f = fixture();
        assert!(f.service.delete("ghost", false).await.unwrap().is_none());
        assert!(f.scheduler.canceled_keys().is_empty());
    }

    #[tokio::test]
    async fn test_handle_command_routes() {
        let f = fixture();
        let record = push_record();
        let reference = record.id.clone();
        let event = f
            .service
            .handle_command(Command::CreateNotification { record }, false)
            .await
            .unwrap();
        assert!(matches!(event, Some(NotificationEvent::Created { .. })));

        let none = f
            .service
            .handle_command(Command::DeleteNotification { reference }, false)
            .await
            .unwrap();
        assert!(none.is_none());

        let err = f
            .service
            .handle_command(
                Command::SendNotification(SendNotification::new("n-1")),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PresslineError::Validation(_)));
    }
}
