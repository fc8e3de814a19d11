//! SQLite-backed notification record store.
//!
//! Survives restarts and supports concurrent dispatcher workers: every
//! write names the version it read (`WHERE id = ? AND version = ?`) and
//! a zero-row update surfaces as a version conflict instead of a silent
//! overwrite.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pressline_core::error::{PresslineError, Result};
use pressline_core::traits::{NotificationStore, SearchIndex};
use pressline_core::types::{
    Notification, NotificationKind, NotificationQuery, NotifierResult, Page, SendStatus,
    SyncOperation,
};
use tokio::sync::Mutex;

/// SQLite persistence for notification records.
pub struct SqliteNotificationStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteNotificationStore {
    /// Open or create the store database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| PresslineError::Store(format!("DB open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| PresslineError::Store(format!("DB open: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &rusqlite::Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,              -- 'push', 'email', 'social', 'syndication'
                channel_ref TEXT NOT NULL,
                content_ref TEXT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                send_at TEXT,
                send_status TEXT NOT NULL DEFAULT 'draft',
                sent_at TEXT,
                result TEXT,                     -- JSON NotifierResult
                send_on_publish INTEGER NOT NULL DEFAULT 0,
                operation TEXT NOT NULL DEFAULT 'notify',
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_content
                ON notifications (content_ref, created_at);
         ",
        )
        .map_err(|e| PresslineError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
        let kind: String = row.get("kind")?;
        let status: String = row.get("send_status")?;
        let operation: String = row.get("operation")?;
        let result_json: Option<String> = row.get("result")?;

        Ok(Notification {
            id: row.get("id")?,
            kind: parse_kind(&kind),
            channel_ref: row.get("channel_ref")?,
            content_ref: row.get("content_ref")?,
            title: row.get("title")?,
            body: row.get("body")?,
            send_at: parse_time(row.get::<_, Option<String>>("send_at")?),
            send_status: parse_status(&status),
            sent_at: parse_time(row.get::<_, Option<String>>("sent_at")?),
            result: result_json.and_then(|s| serde_json::from_str::<NotifierResult>(&s).ok()),
            send_on_publish: row.get::<_, i64>("send_on_publish")? != 0,
            operation: parse_operation(&operation),
            version: row.get::<_, i64>("version")? as u64,
            created_at: parse_time(row.get::<_, Option<String>>("created_at")?)
                .unwrap_or_else(Utc::now),
            updated_at: parse_time(row.get::<_, Option<String>>("updated_at")?)
                .unwrap_or_else(Utc::now),
        })
    }
}

fn parse_kind(s: &str) -> NotificationKind {
    match s {
        "push" => NotificationKind::Push,
        "email" => NotificationKind::Email,
        "syndication" => NotificationKind::Syndication,
        _ => NotificationKind::Social,
    }
}

fn parse_status(s: &str) -> SendStatus {
    match s {
        "scheduled" => SendStatus::Scheduled,
        "sent" => SendStatus::Sent,
        "failed" => SendStatus::Failed,
        "canceled" => SendStatus::Canceled,
        _ => SendStatus::Draft,
    }
}

fn parse_operation(s: &str) -> SyncOperation {
    match s {
        "create" => SyncOperation::Create,
        "update" => SyncOperation::Update,
        "delete" => SyncOperation::Delete,
        _ => SyncOperation::Notify,
    }
}

fn status_str(status: SendStatus) -> &'static str {
    match status {
        SendStatus::Draft => "draft",
        SendStatus::Scheduled => "scheduled",
        SendStatus::Sent => "sent",
        SendStatus::Failed => "failed",
        SendStatus::Canceled => "canceled",
    }
}

fn operation_str(operation: SyncOperation) -> &'static str {
    match operation {
        SyncOperation::Create => "create",
        SyncOperation::Update => "update",
        SyncOperation::Delete => "delete",
        SyncOperation::Notify => "notify",
    }
}

fn parse_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn get(&self, reference: &str) -> Result<Option<Notification>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM notifications WHERE id = ?1")
            .map_err(|e| PresslineError::Store(format!("Prepare: {e}")))?;
        let record = stmt
            .query_row([reference], Self::row_to_record)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(PresslineError::Store(format!("Get: {other}"))),
            })?;
        Ok(record)
    }

    async fn insert(&self, record: &Notification) -> Result<()> {
        let result_json = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notifications
             (id, kind, channel_ref, content_ref, title, body, send_at, send_status,
              sent_at, result, send_on_publish, operation, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                record.id,
                record.kind.as_str(),
                record.channel_ref,
                record.content_ref,
                record.title,
                record.body,
                record.send_at.map(|t| t.to_rfc3339()),
                status_str(record.send_status),
                record.sent_at.map(|t| t.to_rfc3339()),
                result_json,
                record.send_on_publish as i64,
                operation_str(record.operation),
                record.version as i64,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PresslineError::Store(format!("Insert: {e}")))?;
        Ok(())
    }

    async fn update(&self, record: &Notification, expected_version: u64) -> Result<()> {
        let result_json = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE notifications SET
                    kind = ?1, channel_ref = ?2, content_ref = ?3, title = ?4, body = ?5,
                    send_at = ?6, send_status = ?7, sent_at = ?8, result = ?9,
                    send_on_publish = ?10, operation = ?11, version = ?12, updated_at = ?13
                 WHERE id = ?14 AND version = ?15",
                rusqlite::params![
                    record.kind.as_str(),
                    record.channel_ref,
                    record.content_ref,
                    record.title,
                    record.body,
                    record.send_at.map(|t| t.to_rfc3339()),
                    status_str(record.send_status),
                    record.sent_at.map(|t| t.to_rfc3339()),
                    result_json,
                    record.send_on_publish as i64,
                    operation_str(record.operation),
                    (expected_version + 1) as i64,
                    Utc::now().to_rfc3339(),
                    record.id,
                    expected_version as i64,
                ],
            )
            .map_err(|e| PresslineError::Store(format!("Update: {e}")))?;

        if changed == 0 {
            return Err(PresslineError::VersionConflict {
                reference: record.id.clone(),
                expected: expected_version,
            });
        }
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM notifications WHERE id = ?1", [reference])
            .map_err(|e| PresslineError::Store(format!("Delete: {e}")))?;
        Ok(())
    }
}

/// The notification rows double as the search index for deployments
/// that run everything off one SQLite file: `index` is an upsert onto
/// the same table, so both write paths converge on one row.
#[async_trait]
impl SearchIndex for SqliteNotificationStore {
    async fn index(&self, record: &Notification) -> Result<()> {
        let result_json = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO notifications
             (id, kind, channel_ref, content_ref, title, body, send_at, send_status,
              sent_at, result, send_on_publish, operation, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                record.id,
                record.kind.as_str(),
                record.channel_ref,
                record.content_ref,
                record.title,
                record.body,
                record.send_at.map(|t| t.to_rfc3339()),
                status_str(record.send_status),
                record.sent_at.map(|t| t.to_rfc3339()),
                result_json,
                record.send_on_publish as i64,
                operation_str(record.operation),
                record.version as i64,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PresslineError::Index(format!("Index: {e}")))?;
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM notifications WHERE id = ?1", [reference])
            .map_err(|e| PresslineError::Index(format!("Delete: {e}")))?;
        Ok(())
    }

    async fn query(&self, query: &NotificationQuery) -> Result<Page<Notification>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<String> = Vec::new();
        if let Some(content_ref) = &query.content_ref {
            clauses.push("content_ref = ?");
            params.push(content_ref.clone());
        }
        if let Some(channel_ref) = &query.channel_ref {
            clauses.push("channel_ref = ?");
            params.push(channel_ref.clone());
        }
        if let Some(status) = query.status {
            clauses.push("send_status = ?");
            params.push(status_str(status).to_string());
        }
        if let Some(kind) = query.kind {
            clauses.push("kind = ?");
            params.push(kind.as_str().to_string());
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit = if query.limit == 0 { 50 } else { query.limit };

        let conn = self.conn.lock().await;
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM notifications{where_sql}"),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )
            .map_err(|e| PresslineError::Index(format!("Count: {e}")))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT * FROM notifications{where_sql}
                 ORDER BY created_at ASC, id ASC LIMIT {limit} OFFSET {}",
                query.offset
            ))
            .map_err(|e| PresslineError::Index(format!("Prepare: {e}")))?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), Self::row_to_record)
            .map_err(|e| PresslineError::Index(format!("Query: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| PresslineError::Index(format!("Row: {e}")))?;

        Ok(Page {
            items,
            total: total as usize,
        })
    }
}
