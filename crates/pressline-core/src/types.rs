//! Core data model: notification records, delivery outcomes, and the
//! read-only snapshots of external content items and channels.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length kept for a backend error message.
const ERROR_MESSAGE_MAX: usize = 512;

// ─── Outcome taxonomy ──────────────────────────────────────

/// Outcome of one delivery attempt, gRPC-style.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCode {
    Ok,
    /// Malformed or missing required field (e.g. unpublished content
    /// targeted by a non-delete syndication operation).
    InvalidArgument,
    /// Channel/kind mismatch at dispatch time.
    NotFound,
    /// Content state disallows sending right now.
    Aborted,
    /// Duplicate create on the remote (e.g. syndication article exists).
    AlreadyExists,
    /// Backend disabled by operator flag.
    Cancelled,
    /// No backend registered for this notification kind.
    Unimplemented,
    DeadlineExceeded,
    Internal,
    ResourceExhausted,
    Unavailable,
    Unknown,
}

impl OutcomeCode {
    /// Codes the dispatcher is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OutcomeCode::Aborted
                | OutcomeCode::DeadlineExceeded
                | OutcomeCode::Internal
                | OutcomeCode::ResourceExhausted
                | OutcomeCode::Unavailable
                | OutcomeCode::Unknown
        )
    }

    /// Map an HTTP status into the taxonomy.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => OutcomeCode::Ok,
            400 => OutcomeCode::InvalidArgument,
            401 | 403 => OutcomeCode::InvalidArgument,
            404 => OutcomeCode::NotFound,
            409 => OutcomeCode::AlreadyExists,
            429 => OutcomeCode::ResourceExhausted,
            500 => OutcomeCode::Internal,
            502 | 503 => OutcomeCode::Unavailable,
            504 => OutcomeCode::DeadlineExceeded,
            _ => OutcomeCode::Unknown,
        }
    }
}

/// The recorded result of one delivery attempt.
///
/// Backends never raise: every attempt, however it went, collapses into
/// one of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifierResult {
    pub ok: bool,
    pub code: OutcomeCode,
    pub http_code: Option<u16>,
    pub error_name: Option<String>,
    pub error_message: Option<String>,
    /// Opaque provider response, kept for diagnosis.
    pub raw_response: Option<String>,
    /// Provider-specific identifiers (remote message id, revision token).
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl NotifierResult {
    /// Successful attempt.
    pub fn success(code: OutcomeCode) -> Self {
        Self {
            ok: true,
            code,
            http_code: None,
            error_name: None,
            error_message: None,
            raw_response: None,
            tags: HashMap::new(),
        }
    }

    /// Failed attempt with a named error.
    pub fn failure(code: OutcomeCode, error_name: &str, error_message: &str) -> Self {
        let mut message = error_message.to_string();
        message.truncate(ERROR_MESSAGE_MAX);
        Self {
            ok: false,
            code,
            http_code: None,
            error_name: Some(error_name.to_string()),
            error_message: Some(message),
            raw_response: None,
            tags: HashMap::new(),
        }
    }

    pub fn with_http_code(mut self, status: u16) -> Self {
        self.http_code = Some(status);
        self
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|s| s.as_str())
    }
}

// ─── Notification record ──────────────────────────────────────

/// The closed set of notification kinds. Each kind carries its own
/// payload-building strategy behind the single `Notifier` trait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Push,
    Email,
    Social,
    Syndication,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Push => "push",
            NotificationKind::Email => "email",
            NotificationKind::Social => "social",
            NotificationKind::Syndication => "syndication",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which remote action a content-syndication record performs.
/// `Notify` is the only operation the generic fan-out loop touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
    #[default]
    Notify,
}

/// Lifecycle state of a notification record.
///
/// Draft and Scheduled are derived from `send_at`, never set directly.
/// Sent, Failed, and Canceled are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Draft,
    Scheduled,
    Sent,
    Failed,
    Canceled,
}

impl SendStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SendStatus::Sent | SendStatus::Failed | SendStatus::Canceled
        )
    }
}

/// One deliverable unit and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Unique record reference.
    pub id: String,
    pub kind: NotificationKind,
    /// Destination channel reference; must resolve to a channel whose
    /// type matches the kind by the naming convention.
    pub channel_ref: String,
    /// Optional reference to the content item this record is bound to.
    pub content_ref: Option<String>,
    /// Channel-specific payload fields, opaque to the engine.
    pub title: String,
    pub body: String,
    /// When to deliver. None means Draft.
    pub send_at: Option<DateTime<Utc>>,
    pub send_status: SendStatus,
    /// Set only on Sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// Last delivery outcome, if any attempt was made.
    pub result: Option<NotifierResult>,
    /// Keep `send_at`/title in sync with the content's publish lifecycle.
    pub send_on_publish: bool,
    /// Remote action tag for syndication backends.
    #[serde(default)]
    pub operation: SyncOperation,
    /// Optimistic concurrency token, bumped on every committed write.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Create a fresh Draft record.
    pub fn new(kind: NotificationKind, channel_ref: &str, title: &str, body: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            channel_ref: channel_ref.to_string(),
            content_ref: None,
            title: title.to_string(),
            body: body.to_string(),
            send_at: None,
            send_status: SendStatus::Draft,
            sent_at: None,
            result: None,
            send_on_publish: false,
            operation: SyncOperation::Notify,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_content(mut self, content_ref: &str, send_on_publish: bool) -> Self {
        self.content_ref = Some(content_ref.to_string());
        self.send_on_publish = send_on_publish;
        self
    }

    pub fn with_send_at(mut self, at: DateTime<Utc>) -> Self {
        self.send_at = Some(at);
        self
    }

    pub fn with_operation(mut self, operation: SyncOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.send_status.is_terminal()
    }

    /// The non-terminal status this record's `send_at` implies.
    pub fn derived_status(&self) -> SendStatus {
        if self.send_at.is_some() {
            SendStatus::Scheduled
        } else {
            SendStatus::Draft
        }
    }

    /// Unique scheduler key for this record's pending delivery job.
    pub fn job_key(&self) -> String {
        format!("{}.send", self.id)
    }
}

// ─── External snapshots ──────────────────────────────────────

/// Publish state of an external content item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Unpublished,
    Deleted,
    Expired,
}

/// Read-only snapshot of a content item (article, poll, gallery).
/// The engine only reads these fields and reacts to transition events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub reference: String,
    pub status: ContentStatus,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub publish_at: Option<DateTime<Utc>>,
    /// Whether this content type participates in notification fan-out.
    #[serde(default)]
    pub has_notifications: bool,
    /// Remote revision token for syndicated documents.
    pub revision: Option<String>,
}

impl ContentItem {
    pub fn new(reference: &str, title: &str, status: ContentStatus) -> Self {
        Self {
            reference: reference.to_string(),
            status,
            title: title.to_string(),
            published_at: None,
            publish_at: None,
            has_notifications: true,
            revision: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }
}

/// Destination configuration, read-only to the engine. Credential fields
/// inside `settings` may be encrypted; backends decrypt them via
/// `pressline-security`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub reference: String,
    /// Channel type string matched against the notification kind.
    pub channel_type: String,
    pub label: String,
    pub settings: serde_json::Value,
}

impl Channel {
    pub fn new(reference: &str, channel_type: &str, settings: serde_json::Value) -> Self {
        Self {
            reference: reference.to_string(),
            channel_type: channel_type.to_string(),
            label: reference.to_string(),
            settings,
        }
    }

    /// Fetch a string setting, empty when absent.
    pub fn setting(&self, key: &str) -> &str {
        self.settings.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }
}

// ─── Query/paging ──────────────────────────────────────

/// Filter for enumerating notifications through the search index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationQuery {
    pub content_ref: Option<String>,
    pub channel_ref: Option<String>,
    pub status: Option<SendStatus>,
    pub kind: Option<NotificationKind>,
    /// Page offset into the created-at-ascending ordering.
    pub offset: usize,
    pub limit: usize,
}

impl NotificationQuery {
    pub fn for_content(content_ref: &str) -> Self {
        Self {
            content_ref: Some(content_ref.to_string()),
            limit: 50,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: SendStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_channel(mut self, channel_ref: &str) -> Self {
        self.channel_ref = Some(channel_ref.to_string());
        self
    }

    pub fn next_page(mut self) -> Self {
        self.offset += self.limit;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matches across all pages.
    pub total: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        for code in [
            OutcomeCode::Aborted,
            OutcomeCode::DeadlineExceeded,
            OutcomeCode::Internal,
            OutcomeCode::ResourceExhausted,
            OutcomeCode::Unavailable,
            OutcomeCode::Unknown,
        ] {
            assert!(code.is_retryable(), "{code:?} should be retryable");
        }
        for code in [
            OutcomeCode::Ok,
            OutcomeCode::InvalidArgument,
            OutcomeCode::NotFound,
            OutcomeCode::AlreadyExists,
            OutcomeCode::Cancelled,
            OutcomeCode::Unimplemented,
        ] {
            assert!(!code.is_retryable(), "{code:?} should be terminal");
        }
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(OutcomeCode::from_http_status(200), OutcomeCode::Ok);
        assert_eq!(
            OutcomeCode::from_http_status(429),
            OutcomeCode::ResourceExhausted
        );
        assert_eq!(OutcomeCode::from_http_status(503), OutcomeCode::Unavailable);
        assert_eq!(
            OutcomeCode::from_http_status(504),
            OutcomeCode::DeadlineExceeded
        );
        assert_eq!(OutcomeCode::from_http_status(418), OutcomeCode::Unknown);
    }

    #[test]
    fn test_error_message_truncated() {
        let long = "x".repeat(2000);
        let result = NotifierResult::failure(OutcomeCode::Internal, "Boom", &long);
        assert_eq!(result.error_message.unwrap().len(), 512);
    }

    #[test]
    fn test_derived_status() {
        let draft = Notification::new(NotificationKind::Push, "ch1", "t", "b");
        assert_eq!(draft.derived_status(), SendStatus::Draft);
        let scheduled = draft.with_send_at(Utc::now());
        assert_eq!(scheduled.derived_status(), SendStatus::Scheduled);
    }

    #[test]
    fn test_job_key() {
        let mut record = Notification::new(NotificationKind::Social, "ch1", "t", "b");
        record.id = "n-42".into();
        assert_eq!(record.job_key(), "n-42.send");
    }

    #[test]
    fn test_result_tags() {
        let result = NotifierResult::success(OutcomeCode::Ok)
            .with_tag("message_id", "m-1")
            .with_tag("revision", "r2");
        assert_eq!(result.tag("revision"), Some("r2"));
        assert_eq!(result.tag("missing"), None);
    }
}
