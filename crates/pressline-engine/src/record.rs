//! The notification state machine.
//!
//! Pure functions over [`Notification`]: a side-effect-free validator
//! and the transition set Draft → Scheduled → {Sent, Failed, Canceled}.
//! Draft and Scheduled are derived from `send_at`, never set directly;
//! the terminal states refuse every further mutation via the
//! "already sent" guard.

use chrono::{DateTime, Utc};
use pressline_core::error::{PresslineError, Result};
use pressline_core::naming::Naming;
use pressline_core::types::{Channel, Notification, NotifierResult, SendStatus};

/// Kind/channel matching by the 1:1 naming convention. Violations are
/// validation failures at create/update time, never at delivery time.
pub fn validate_channel_match(
    record: &Notification,
    channel: &Channel,
    naming: &Naming,
) -> Result<()> {
    if !naming.matches(record.kind, &channel.channel_type) {
        return Err(PresslineError::Validation(format!(
            "notification kind '{}' requires channel type '{}', got '{}'",
            record.kind,
            naming.channel_type(record.kind),
            channel.channel_type
        )));
    }
    Ok(())
}

/// Create-time validation. `scheduled_peers` are the other records the
/// caller found in Scheduled state for the same (channel, content)
/// pair; for a send-on-publish record there may be none.
pub fn validate_create(
    record: &Notification,
    channel: &Channel,
    naming: &Naming,
    scheduled_peers: &[Notification],
) -> Result<()> {
    validate_channel_match(record, channel, naming)?;

    if record.send_on_publish && record.content_ref.is_some() {
        if let Some(peer) = scheduled_peers.iter().find(|p| p.id != record.id) {
            return Err(PresslineError::Validation(format!(
                "already scheduled: notification {} is pending for the same channel and content",
                peer.id
            )));
        }
    }
    Ok(())
}

/// Finalize a record for creation: the status is derived from
/// `send_at`, whatever the caller put in `send_status`.
pub fn prepare_create(mut record: Notification) -> Notification {
    record.send_status = record.derived_status();
    record.sent_at = None;
    record.version = 0;
    record
}

/// Apply an update on top of `old`. The lifecycle fields always carry
/// over from `old`; an update may never resurrect a terminal record.
pub fn prepare_update(old: &Notification, mut new: Notification) -> Result<Notification> {
    if old.is_terminal() {
        return Err(PresslineError::AlreadySent(old.id.clone()));
    }

    new.id = old.id.clone();
    new.send_status = old.send_status;
    new.sent_at = old.sent_at;
    new.result = old.result.clone();
    new.created_at = old.created_at;
    new.version = old.version;
    // Draft/Scheduled track the (possibly changed) send_at.
    new.send_status = new.derived_status();
    new.updated_at = Utc::now();
    Ok(new)
}

/// Commit a successful delivery.
pub fn mark_sent(
    record: &Notification,
    result: NotifierResult,
    now: DateTime<Utc>,
) -> Result<Notification> {
    if record.is_terminal() {
        return Err(PresslineError::AlreadySent(record.id.clone()));
    }
    let mut sent = record.clone();
    sent.send_status = SendStatus::Sent;
    sent.sent_at = Some(now);
    sent.result = Some(result);
    sent.updated_at = now;
    Ok(sent)
}

/// Commit a terminally failed delivery. `sent_at` stays unset.
pub fn mark_failed(
    record: &Notification,
    result: NotifierResult,
    now: DateTime<Utc>,
) -> Result<Notification> {
    if record.is_terminal() {
        return Err(PresslineError::AlreadySent(record.id.clone()));
    }
    let mut failed = record.clone();
    failed.send_status = SendStatus::Failed;
    failed.result = Some(result);
    failed.updated_at = now;
    Ok(failed)
}

/// Deletion forces Canceled on anything that never reached Sent/Failed.
pub fn prepare_delete(record: &Notification) -> Notification {
    let mut deleted = record.clone();
    if !matches!(
        deleted.send_status,
        SendStatus::Sent | SendStatus::Failed
    ) {
        deleted.send_status = SendStatus::Canceled;
    }
    deleted.updated_at = Utc::now();
    deleted
}
