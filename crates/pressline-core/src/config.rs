//! Pressline configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PresslineError, Result};
use crate::naming::Naming;
use crate::types::Channel;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresslineConfig {
    #[serde(default)]
    pub naming: Naming,
    /// Seconds after a content item's publish time that a
    /// send-on-publish notification fires.
    #[serde(default = "default_publish_delay")]
    pub publish_delay_secs: i64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Channel definitions for standalone deployments, where the
    /// destinations live in the config file instead of a host CMS.
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelEntry>,
}

fn default_publish_delay() -> i64 {
    10
}

impl Default for PresslineConfig {
    fn default() -> Self {
        Self {
            naming: Naming::default(),
            publish_delay_secs: default_publish_delay(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            backend: BackendConfig::default(),
            channels: Vec::new(),
        }
    }
}

/// One `[[channel]]` block from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub reference: String,
    pub channel_type: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Backend-specific settings; credential fields may be encrypted.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ChannelEntry {
    pub fn to_channel(&self) -> Channel {
        let mut channel = Channel::new(&self.reference, &self.channel_type, self.settings.clone());
        if let Some(label) = &self.label {
            channel.label = label.clone();
        }
        channel
    }
}

impl PresslineConfig {
    /// Load config from the default path (~/.pressline/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PresslineError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PresslineError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Pressline home directory (~/.pressline).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pressline")
    }
}

/// Scheduler substrate tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum lead time for a scheduled job. Target times closer than
    /// this are clamped forward so the scheduler never rejects a past
    /// timestamp.
    #[serde(default = "default_min_lead")]
    pub min_lead_secs: i64,
}

fn default_min_lead() -> i64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_lead_secs: default_min_lead(),
        }
    }
}

/// Retry policy for transient delivery failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff step: attempt n is rescheduled n steps out.
    #[serde(default = "default_backoff_step")]
    pub backoff_step_secs: i64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_step() -> i64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step(),
        }
    }
}

/// Per-backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub push: ProviderConfig,
    #[serde(default)]
    pub email: ProviderConfig,
    #[serde(default)]
    pub social: ProviderConfig,
    #[serde(default)]
    pub syndication: ProviderConfig,
}

/// Settings shared by every provider backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Operator kill switch. Disabled backends return Cancelled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoint override, mostly for test servers.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PresslineConfig::default();
        assert_eq!(config.publish_delay_secs, 10);
        assert_eq!(config.scheduler.min_lead_secs, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_step_secs, 120);
        assert_eq!(config.naming.vendor_prefix, "pressline");
        assert!(config.backend.syndication.enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            publish_delay_secs = 30

            [naming]
            vendor_prefix = "acme"

            [retry]
            max_attempts = 5

            [backend.social]
            enabled = false
        "#;
        let config: PresslineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.publish_delay_secs, 30);
        assert_eq!(config.naming.vendor_prefix, "acme");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_step_secs, 120);
        assert!(!config.backend.social.enabled);
        assert!(config.backend.push.enabled);
    }

    #[test]
    fn test_parse_channel_blocks() {
        let toml_str = r#"
            [[channel]]
            reference = "push-main"
            channel_type = "pressline-push-app"
            label = "Main push audience"

            [channel.settings]
            server_key = "enc:abc"
            topic = "breaking"

            [[channel]]
            reference = "social-main"
            channel_type = "pressline-social-app"
        "#;
        let config: PresslineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.channels.len(), 2);

        let channel = config.channels[0].to_channel();
        assert_eq!(channel.reference, "push-main");
        assert_eq!(channel.label, "Main push audience");
        assert_eq!(channel.setting("topic"), "breaking");

        let bare = config.channels[1].to_channel();
        assert_eq!(bare.label, "social-main");
        assert_eq!(bare.setting("anything"), "");
    }
}
