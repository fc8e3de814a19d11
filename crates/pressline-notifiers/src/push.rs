//! Push backend: FCM-style HTTP delivery.
//!
//! Channel settings: `server_key` (encrypted), `topic`. The remote
//! message id, when the provider returns one, lands in
//! `tags["message_id"]`.

use async_trait::async_trait;
use pressline_core::config::ProviderConfig;
use pressline_core::traits::Notifier;
use pressline_core::types::{
    Channel, ContentItem, Notification, NotifierResult, OutcomeCode,
};
use pressline_security::CredentialCipher;

const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

pub struct PushNotifier {
    config: ProviderConfig,
    cipher: CredentialCipher,
    client: reqwest::Client,
}

impl PushNotifier {
    pub fn new(config: ProviderConfig, cipher: CredentialCipher) -> Self {
        Self {
            config,
            cipher,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Provider payload built from the record and its channel.
    pub fn build_payload(notification: &Notification, channel: &Channel) -> serde_json::Value {
        serde_json::json!({
            "to": format!("/topics/{}", channel.setting("topic")),
            "notification": {
                "title": notification.title,
                "body": notification.body,
            },
        })
    }

    /// Pull the provider message id out of a send response.
    fn parse_message_id(body: &str) -> Option<String> {
        let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
        parsed
            .get("message_id")
            .and_then(|v| v.as_i64().map(|i| i.to_string()).or_else(|| {
                v.as_str().map(String::from)
            }))
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    fn name(&self) -> &str {
        "push"
    }

    async fn send(
        &self,
        notification: &Notification,
        channel: &Channel,
        _content: Option<&ContentItem>,
    ) -> NotifierResult {
        if !self.config.enabled {
            return NotifierResult::failure(
                OutcomeCode::Cancelled,
                "BackendDisabled",
                "push backend disabled by operator flag",
            );
        }

        let server_key = match self.cipher.decrypt(channel.setting("server_key")) {
            Ok(key) => key,
            Err(e) => {
                return NotifierResult::failure(
                    OutcomeCode::InvalidArgument,
                    "CredentialError",
                    &e.to_string(),
                );
            }
        };

        let payload = Self::build_payload(notification, channel);
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("key={server_key}"))
            .json(&payload)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                let code = OutcomeCode::from_http_status(status);
                if code == OutcomeCode::Ok {
                    tracing::info!("✅ Push sent: {}", notification.id);
                    let mut result = NotifierResult::success(OutcomeCode::Ok)
                        .with_http_code(status)
                        .with_raw_response(body.clone());
                    if let Some(message_id) = Self::parse_message_id(&body) {
                        result = result.with_tag("message_id", message_id);
                    }
                    result
                } else {
                    NotifierResult::failure(code, "PushApiError", &body)
                        .with_http_code(status)
                        .with_raw_response(body)
                }
            }
            Err(e) => {
                let code = if e.is_timeout() {
                    OutcomeCode::DeadlineExceeded
                } else {
                    OutcomeCode::Unavailable
                };
                NotifierResult::failure(code, "PushTransportError", &e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(cipher: &CredentialCipher) -> Channel {
        Channel::new(
            "ch-push",
            "pressline-push-app",
            serde_json::json!({
                "server_key": cipher.encrypt("fcm-key-1"),
                "topic": "breaking-news",
            }),
        )
    }

    #[test]
    fn test_build_payload() {
        let cipher = CredentialCipher::from_secret("s");
        let record = Notification::new(
            pressline_core::types::NotificationKind::Push,
            "ch-push",
            "Headline",
            "Something happened",
        );
        let payload = PushNotifier::build_payload(&record, &channel(&cipher));
        assert_eq!(payload["to"], "/topics/breaking-news");
        assert_eq!(payload["notification"]["title"], "Headline");
    }

    #[test]
    fn test_parse_message_id() {
        assert_eq!(
            PushNotifier::parse_message_id(r#"{"message_id": 8573}"#),
            Some("8573".into())
        );
        assert_eq!(
            PushNotifier::parse_message_id(r#"{"message_id": "projects/x/messages/1"}"#),
            Some("projects/x/messages/1".into())
        );
        assert_eq!(PushNotifier::parse_message_id("not json"), None);
    }

    #[tokio::test]
    async fn test_disabled_backend_is_cancelled() {
        let cipher = CredentialCipher::from_secret("s");
        let config = ProviderConfig {
            enabled: false,
            ..Default::default()
        };
        let notifier = PushNotifier::new(config, cipher.clone());
        let record = Notification::new(
            pressline_core::types::NotificationKind::Push,
            "ch-push",
            "t",
            "b",
        );
        let result = notifier.send(&record, &channel(&cipher), None).await;
        assert!(!result.ok);
        assert_eq!(result.code, OutcomeCode::Cancelled);
    }

    #[tokio::test]
    async fn test_bad_credentials_invalid_argument() {
        let cipher = CredentialCipher::from_secret("s");
        let notifier = PushNotifier::new(ProviderConfig::default(), cipher);
        let bad_channel = Channel::new(
            "ch-push",
            "pressline-push-app",
            serde_json::json!({"server_key": "not-encrypted", "topic": "x"}),
        );
        let record = Notification::new(
            pressline_core::types::NotificationKind::Push,
            "ch-push",
            "t",
            "b",
        );
        let result = notifier.send(&record, &bad_channel, None).await;
        assert!(!result.ok);
        assert_eq!(result.code, OutcomeCode::InvalidArgument);
    }
}
