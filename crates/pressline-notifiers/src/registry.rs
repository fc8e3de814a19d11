//! Backend registry, keyed by notification kind.

use std::collections::HashMap;
use std::sync::Arc;

use pressline_core::traits::Notifier;
use pressline_core::types::{
    Channel, ContentItem, Notification, NotificationKind, NotifierResult, OutcomeCode,
};

/// Resolves the delivery backend for a notification's kind.
#[derive(Default)]
pub struct NotifierRegistry {
    backends: HashMap<NotificationKind, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: NotificationKind, backend: Arc<dyn Notifier>) {
        tracing::info!("📦 Notifier registered: {} -> {}", kind, backend.name());
        self.backends.insert(kind, backend);
    }

    pub fn resolve(&self, kind: NotificationKind) -> Option<Arc<dyn Notifier>> {
        self.backends.get(&kind).cloned()
    }

    /// Invoke the backend for this notification's kind. An unresolvable
    /// kind is a terminal Unimplemented result, not a pipeline failure.
    pub async fn dispatch(
        &self,
        notification: &Notification,
        channel: &Channel,
        content: Option<&ContentItem>,
    ) -> NotifierResult {
        match self.resolve(notification.kind) {
            Some(backend) => backend.send(notification, channel, content).await,
            None => {
                tracing::warn!(
                    "⚠️ No notifier registered for kind '{}' (notification {})",
                    notification.kind,
                    notification.id
                );
                NotifierResult::failure(
                    OutcomeCode::Unimplemented,
                    "NoBackend",
                    &format!("no notifier registered for kind '{}'", notification.kind),
                )
            }
        }
    }
}
