//! Social backend: webhook-style JSON POST to the provider's publish
//! endpoint.
//!
//! Channel settings: `post_url`, `token` (encrypted). A 429 from the
//! provider maps to ResourceExhausted so the dispatcher backs off
//! instead of failing terminally.

use async_trait::async_trait;
use pressline_core::config::ProviderConfig;
use pressline_core::traits::Notifier;
use pressline_core::types::{
    Channel, ContentItem, Notification, NotifierResult, OutcomeCode,
};
use pressline_security::CredentialCipher;

pub struct SocialNotifier {
    config: ProviderConfig,
    cipher: CredentialCipher,
    client: reqwest::Client,
}

impl SocialNotifier {
    pub fn new(config: ProviderConfig, cipher: CredentialCipher) -> Self {
        Self {
            config,
            cipher,
            client: reqwest::Client::new(),
        }
    }

    /// Post body: title and body joined, plus a canonical link when the
    /// record is bound to content.
    pub fn build_payload(
        notification: &Notification,
        content: Option<&ContentItem>,
    ) -> serde_json::Value {
        let text = if notification.body.is_empty() {
            notification.title.clone()
        } else {
            format!("{}\n\n{}", notification.title, notification.body)
        };
        serde_json::json!({
            "text": text,
            "content_ref": content.map(|c| c.reference.clone()),
        })
    }

    fn parse_post_id(body: &str) -> Option<String> {
        let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
        parsed.get("id").and_then(|v| v.as_str()).map(String::from)
    }
}

#[async_trait]
impl Notifier for SocialNotifier {
    fn name(&self) -> &str {
        "social"
    }

    async fn send(
        &self,
        notification: &Notification,
        channel: &Channel,
        content: Option<&ContentItem>,
    ) -> NotifierResult {
        if !self.config.enabled {
            return NotifierResult::failure(
                OutcomeCode::Cancelled,
                "BackendDisabled",
                "social backend disabled by operator flag",
            );
        }

        let token = match self.cipher.decrypt(channel.setting("token")) {
            Ok(t) => t,
            Err(e) => {
                return NotifierResult::failure(
                    OutcomeCode::InvalidArgument,
                    "CredentialError",
                    &e.to_string(),
                );
            }
        };

        let url = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or_else(|| channel.setting("post_url"));
        if url.is_empty() {
            return NotifierResult::failure(
                OutcomeCode::InvalidArgument,
                "MissingPostUrl",
                "channel has no post_url setting",
            );
        }

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&Self::build_payload(notification, content))
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                let code = OutcomeCode::from_http_status(status);
                if code == OutcomeCode::Ok {
                    tracing::info!("✅ Social post sent: {}", notification.id);
                    let mut result = NotifierResult::success(OutcomeCode::Ok)
                        .with_http_code(status)
                        .with_raw_response(body.clone());
                    if let Some(post_id) = Self::parse_post_id(&body) {
                        result = result.with_tag("post_id", post_id);
                    }
                    result
                } else {
                    NotifierResult::failure(code, "SocialApiError", &body)
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
                NotifierResult::failure(code, "SocialTransportError", &e.to_string())
            }
        }
    }
}
