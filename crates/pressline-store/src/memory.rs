//! In-memory implementations of the external collaborators.
//!
//! These back the engine test-suites and local development runs. The
//! scheduler fake records every schedule/cancel call so tests can
//! assert the exactly-one-pending-job-per-key property.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pressline_core::commands::Command;
use pressline_core::error::{PresslineError, Result};
use pressline_core::traits::{
    ChannelStore, ContentStore, JobScheduler, NotificationStore, OperatorAlerts, SearchIndex,
};
use pressline_core::types::{
    Channel, ContentItem, Notification, NotificationQuery, Page,
};

// ─── Content store ──────────────────────────────────────

#[derive(Default)]
pub struct MemoryContentStore {
    items: Mutex<HashMap<String, ContentItem>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, item: ContentItem) {
        self.items
            .lock()
            .unwrap()
            .insert(item.reference.clone(), item);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, reference: &str) -> Result<Option<ContentItem>> {
        Ok(self.items.lock().unwrap().get(reference).cloned())
    }
}

// ─── Channel store ──────────────────────────────────────

#[derive(Default)]
pub struct MemoryChannelStore {
    channels: Mutex<HashMap<String, Channel>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, channel: Channel) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel.reference.clone(), channel);
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn get(&self, reference: &str) -> Result<Option<Channel>> {
        Ok(self.channels.lock().unwrap().get(reference).cloned())
    }
}

// ─── Job scheduler ──────────────────────────────────────

/// A pending job as recorded by [`RecordingScheduler`].
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub command: Command,
    pub at: DateTime<Utc>,
}

/// Scheduler fake with keyed replace semantics, mirroring the real
/// substrate: one pending job per key, later schedule wins.
#[derive(Default)]
pub struct RecordingScheduler {
    pending: Mutex<HashMap<String, PendingJob>>,
    immediate: Mutex<Vec<Command>>,
    canceled: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_job(&self, key: &str) -> Option<PendingJob> {
        self.pending.lock().unwrap().get(key).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn canceled_keys(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }

    pub fn immediate_commands(&self) -> Vec<Command> {
        self.immediate.lock().unwrap().clone()
    }

    /// Pop a due job to hand to the dispatcher, as the substrate would.
    pub fn take_job(&self, key: &str) -> Option<PendingJob> {
        self.pending.lock().unwrap().remove(key)
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule_at(&self, command: Command, at: DateTime<Utc>, key: &str) -> Result<()> {
        // Same key replaces the pending job atomically.
        self.pending
            .lock()
            .unwrap()
            .insert(key.to_string(), PendingJob { command, at });
        Ok(())
    }

    async fn cancel(&self, keys: &[String]) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        let mut canceled = self.canceled.lock().unwrap();
        for key in keys {
            pending.remove(key);
            canceled.push(key.clone());
        }
        Ok(())
    }

    async fn send_now(&self, command: Command) -> Result<()> {
        self.immediate.lock().unwrap().push(command);
        Ok(())
    }
}

// ─── Search index ──────────────────────────────────────

/// In-memory search index ordered by creation time ascending.
#[derive(Default)]
pub struct MemorySearchIndex {
    records: Mutex<HashMap<String, Notification>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(query: &NotificationQuery, record: &Notification) -> bool {
        if let Some(content_ref) = &query.content_ref {
            if record.content_ref.as_deref() != Some(content_ref.as_str()) {
                return false;
            }
        }
        if let Some(channel_ref) = &query.channel_ref {
            if &record.channel_ref != channel_ref {
                return false;
            }
        }
        if let Some(status) = query.status {
            if record.send_status != status {
                return false;
            }
        }
        if let Some(kind) = query.kind {
            if record.kind != kind {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index(&self, record: &Notification) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.records.lock().unwrap().remove(reference);
        Ok(())
    }

    async fn query(&self, query: &NotificationQuery) -> Result<Page<Notification>> {
        let records = self.records.lock().unwrap();
        let mut matched: Vec<Notification> = records
            .values()
            .filter(|r| Self::matches(query, r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let total = matched.len();
        let limit = if query.limit == 0 { 50 } else { query.limit };
        let items = matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect();
        Ok(Page { items, total })
    }
}

// ─── Notification store ──────────────────────────────────────

/// Versioned in-memory record store with the same conflict semantics as
/// the SQLite store.
#[derive(Default)]
pub struct MemoryNotificationStore {
    records: Mutex<HashMap<String, Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn get(&self, reference: &str) -> Result<Option<Notification>> {
        Ok(self.records.lock().unwrap().get(reference).cloned())
    }

    async fn insert(&self, record: &Notification) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Err(PresslineError::Validation(format!(
                "Duplicate notification id {}",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &Notification, expected_version: u64) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let current = records
            .get(&record.id)
            .ok_or_else(|| PresslineError::NotFound(record.id.clone()))?;
        if current.version != expected_version {
            return Err(PresslineError::VersionConflict {
                reference: record.id.clone(),
                expected: expected_version,
            });
        }
        let mut committed = record.clone();
        committed.version = expected_version + 1;
        committed.updated_at = Utc::now();
        records.insert(committed.id.clone(), committed);
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.records.lock().unwrap().remove(reference);
        Ok(())
    }
}

// ─── Operator alerts ──────────────────────────────────────

/// Records operator alerts instead of paging anyone.
#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorAlerts for RecordingAlerts {
    async fn alert(&self, subject: &str, body: &str) {
        tracing::warn!("🚨 Operator alert: {subject}");
        self.alerts
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
    }
}
