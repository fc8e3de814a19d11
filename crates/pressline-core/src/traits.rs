//! Collaborator contracts.
//!
//! The engine talks to everything outside itself through these traits:
//! content and channel stores, the keyed job scheduler, the search
//! index, the versioned notification store, and the per-kind delivery
//! backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::commands::Command;
use crate::error::Result;
use crate::types::{
    Channel, ContentItem, Notification, NotificationQuery, NotifierResult, Page,
};

/// Read access to the external content-item storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, reference: &str) -> Result<Option<ContentItem>>;
}

/// Read access to channel (destination) configuration.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get(&self, reference: &str) -> Result<Option<Channel>>;
}

/// The external at-least-once, timer-based job scheduler.
///
/// Jobs are identified by a string key; scheduling under an existing key
/// atomically replaces the pending job. That replace is the mechanism
/// that keeps at most one pending delivery per record.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn schedule_at(&self, command: Command, at: DateTime<Utc>, key: &str) -> Result<()>;
    /// Remove pending jobs by key; absent keys are a no-op.
    async fn cancel(&self, keys: &[String]) -> Result<()>;
    async fn send_now(&self, command: Command) -> Result<()>;
}

/// Search/index store used to enumerate notifications bound to content.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, record: &Notification) -> Result<()>;
    async fn delete(&self, reference: &str) -> Result<()>;
    /// Paged query, ordered by creation time ascending.
    async fn query(&self, query: &NotificationQuery) -> Result<Page<Notification>>;
}

/// Canonical persistence for notification records, optimistically
/// versioned: commits name the version they read and fail on conflict
/// instead of silently overwriting a concurrent writer.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get(&self, reference: &str) -> Result<Option<Notification>>;
    async fn insert(&self, record: &Notification) -> Result<()>;
    /// Commit `record` if the stored version still equals
    /// `expected_version`; bumps the version on success.
    async fn update(&self, record: &Notification, expected_version: u64) -> Result<()>;
    async fn delete(&self, reference: &str) -> Result<()>;
}

/// One delivery backend. Implementations must never raise: any internal
/// error is converted into an `ok=false` result with a best-effort code.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The kind name this backend serves, for logging.
    fn name(&self) -> &str;

    async fn send(
        &self,
        notification: &Notification,
        channel: &Channel,
        content: Option<&ContentItem>,
    ) -> NotifierResult;
}

/// Out-of-band operator alerting, used when automatic recovery gives up
/// (e.g. the syndication revision cascade is exhausted).
#[async_trait]
pub trait OperatorAlerts: Send + Sync {
    async fn alert(&self, subject: &str, body: &str);
}
