//! Command and event shapes exchanged with collaborators.
//!
//! The engine accepts four commands (create, update, delete, send) and
//! emits four events (created, updated, sent, failed). Every inbound
//! event carries an `is_replay` flag; side-effecting handlers no-op on
//! replay so historical rebuilds stay idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContentItem, Notification, NotifierResult};

/// Deferred delivery command, carried by a scheduled job.
///
/// `retry_count` is transient dispatch state: it lives on the command,
/// never on the persisted record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendNotification {
    pub reference: String,
    #[serde(default)]
    pub retry_count: u32,
}

impl SendNotification {
    pub fn new(reference: &str) -> Self {
        Self {
            reference: reference.to_string(),
            retry_count: 0,
        }
    }

    /// Next attempt of the same delivery.
    pub fn retry(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            retry_count: self.retry_count + 1,
        }
    }
}

/// The commands the engine accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateNotification { record: Notification },
    UpdateNotification { record: Notification },
    DeleteNotification { reference: String },
    SendNotification(SendNotification),
}

/// The events the engine emits. Created/Updated carry the full
/// before/after records; Sent/Failed additionally carry the outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    Created {
        record: Notification,
    },
    Updated {
        previous: Notification,
        record: Notification,
    },
    Sent {
        record: Notification,
        result: NotifierResult,
    },
    Failed {
        record: Notification,
        result: NotifierResult,
    },
}

impl NotificationEvent {
    /// The record as it stands after the event.
    pub fn record(&self) -> &Notification {
        match self {
            NotificationEvent::Created { record }
            | NotificationEvent::Updated { record, .. }
            | NotificationEvent::Sent { record, .. }
            | NotificationEvent::Failed { record, .. } => record,
        }
    }
}

/// Content lifecycle transition observed by the synchronizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentTransition {
    Published,
    Scheduled,
    Updated,
    Unpublished,
    Deleted,
    Expired,
}

/// A content lifecycle event, with replay marking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEvent {
    pub item: ContentItem,
    pub transition: ContentTransition,
    /// True when this event is re-emitted from historical log
    /// reconstruction; handlers must not produce side effects.
    #[serde(default)]
    pub is_replay: bool,
    pub occurred_at: DateTime<Utc>,
}

impl ContentEvent {
    pub fn live(item: ContentItem, transition: ContentTransition) -> Self {
        Self {
            item,
            transition,
            is_replay: false,
            occurred_at: Utc::now(),
        }
    }

    pub fn replay(item: ContentItem, transition: ContentTransition) -> Self {
        Self {
            item,
            transition,
            is_replay: true,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationKind;

    #[test]
    fn test_retry_increments_count() {
        let cmd = SendNotification::new("n-1");
        assert_eq!(cmd.retry_count, 0);
        let next = cmd.retry().retry();
        assert_eq!(next.retry_count, 2);
        assert_eq!(next.reference, "n-1");
    }

    #[test]
    fn test_event_record_accessor() {
        let record = Notification::new(NotificationKind::Push, "ch1", "t", "b");
        let event = NotificationEvent::Created {
            record: record.clone(),
        };
        assert_eq!(event.record().id, record.id);
    }

    #[test]
    fn test_command_serde_tagging() {
        let cmd = Command::SendNotification(SendNotification::new("n-1"));
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"command\":\"send_notification\""));
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}
