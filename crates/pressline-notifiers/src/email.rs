//! Email backend: SMTP submission via lettre.
//!
//! Channel settings: `smtp_host`, `smtp_port`, `username`, `password`
//! (encrypted), `from`, `to`. The `to` address is the channel's
//! distribution address (a list exploder downstream), so one submission
//! per delivery.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pressline_core::config::ProviderConfig;
use pressline_core::error::{PresslineError, Result};
use pressline_core::traits::Notifier;
use pressline_core::types::{
    Channel, ContentItem, Notification, NotifierResult, OutcomeCode,
};
use pressline_security::CredentialCipher;

pub struct EmailNotifier {
    config: ProviderConfig,
    cipher: CredentialCipher,
}

impl EmailNotifier {
    pub fn new(config: ProviderConfig, cipher: CredentialCipher) -> Self {
        Self { config, cipher }
    }

    /// Assemble the SMTP message from the record and channel settings.
    pub fn build_message(notification: &Notification, channel: &Channel) -> Result<Message> {
        let from: Mailbox = channel
            .setting("from")
            .parse()
            .map_err(|e| PresslineError::Validation(format!("Bad from address: {e}")))?;
        let to: Mailbox = channel
            .setting("to")
            .parse()
            .map_err(|e| PresslineError::Validation(format!("Bad to address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(notification.title.clone())
            .body(notification.body.clone())
            .map_err(|e| PresslineError::Validation(format!("Message build: {e}")))
    }

    fn smtp_port(channel: &Channel) -> u16 {
        channel
            .settings
            .get("smtp_port")
            .and_then(|v| v.as_u64())
            .unwrap_or(587) as u16
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
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
                "email backend disabled by operator flag",
            );
        }

        let message = match Self::build_message(notification, channel) {
            Ok(m) => m,
            Err(e) => {
                return NotifierResult::failure(
                    OutcomeCode::InvalidArgument,
                    "MessageBuildError",
                    &e.to_string(),
                );
            }
        };

        let password = match self.cipher.decrypt(channel.setting("password")) {
            Ok(p) => p,
            Err(e) => {
                return NotifierResult::failure(
                    OutcomeCode::InvalidArgument,
                    "CredentialError",
                    &e.to_string(),
                );
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(
            channel.setting("smtp_host"),
        ) {
            Ok(builder) => builder
                .port(Self::smtp_port(channel))
                .credentials(Credentials::new(
                    channel.setting("username").to_string(),
                    password,
                ))
                .timeout(Some(std::time::Duration::from_secs(
                    self.config.timeout_secs,
                )))
                .build(),
            Err(e) => {
                return NotifierResult::failure(
                    OutcomeCode::InvalidArgument,
                    "SmtpConfigError",
                    &e.to_string(),
                );
            }
        };

        match transport.send(message).await {
            Ok(response) => {
                tracing::info!("✅ Email submitted: {}", notification.id);
                NotifierResult::success(OutcomeCode::Ok)
                    .with_raw_response(format!("{:?}", response.code()))
            }
            Err(e) => {
                let code = if e.is_timeout() {
                    OutcomeCode::DeadlineExceeded
                } else if e.is_permanent() {
                    OutcomeCode::Internal
                } else {
                    OutcomeCode::Unavailable
                };
                NotifierResult::failure(code, "SmtpError", &e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_core::types::NotificationKind;

    fn channel(cipher: &CredentialCipher) -> Channel {
        Channel::new(
            "ch-email",
            "pressline-email-app",
            serde_json::json!({
                "smtp_host": "smtp.example.com",
                "smtp_port": 2525,
                "username": "newsroom",
                "password": cipher.encrypt("hunter2"),
                "from": "Newsroom <news@example.com>",
                "to": "subscribers@example.com",
            }),
        )
    }

    #[test]
    fn test_build_message() {
        let cipher = CredentialCipher::from_secret("s");
        let record =
            Notification::new(NotificationKind::Email, "ch-email", "Daily brief", "Hello!");
        assert!(EmailNotifier::build_message(&record, &channel(&cipher)).is_ok());
    }

    #[test]
    fn test_build_message_bad_address() {
        let record = Notification::new(NotificationKind::Email, "ch-email", "t", "b");
        let bad = Channel::new(
            "ch-email",
            "pressline-email-app",
            serde_json::json!({"from": "not an address", "to": "subscribers@example.com"}),
        );
        assert!(EmailNotifier::build_message(&record, &bad).is_err());
    }

    #[test]
    fn test_smtp_port_default() {
        let no_port = Channel::new("ch", "pressline-email-app", serde_json::json!({}));
        assert_eq!(EmailNotifier::smtp_port(&no_port), 587);
        let cipher = CredentialCipher::from_secret("s");
        assert_eq!(EmailNotifier::smtp_port(&channel(&cipher)), 2525);
    }

    #[tokio::test]
    async fn test_disabled_backend_is_cancelled() {
        let cipher = CredentialCipher::from_secret("s");
        let notifier = EmailNotifier::new(
            ProviderConfig {
                enabled: false,
                ..Default::default()
            },
            cipher.clone(),
        );
        let record = Notification::new(NotificationKind::Email, "ch-email", "t", "b");
        let result = notifier.send(&record, &channel(&cipher), None).await;
        assert_eq!(result.code, OutcomeCode::Cancelled);
    }

    #[tokio::test]
    async fn test_bad_message_invalid_argument() {
        let cipher = CredentialCipher::from_secret("s");
        let notifier = EmailNotifier::new(ProviderConfig::default(), cipher);
        let record = Notification::new(NotificationKind::Email, "ch-email", "t", "b");
        let bad = Channel::new("ch-email", "pressline-email-app", serde_json::json!({}));
        let result = notifier.send(&record, &bad, None).await;
        assert!(!result.ok);
        assert_eq!(result.code, OutcomeCode::InvalidArgument);
    }
}
