//! Vendor naming convention, passed in explicitly rather than read from
//! process-wide state.

use serde::{Deserialize, Serialize};

use crate::types::NotificationKind;

/// Resolves the channel type a notification kind must be bound to.
///
/// The convention is 1:1 by name: with the default `pressline` prefix a
/// Social notification may only target a `pressline-social-app` channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Naming {
    pub vendor_prefix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            vendor_prefix: "pressline".into(),
        }
    }
}

impl Naming {
    pub fn new(vendor_prefix: &str) -> Self {
        Self {
            vendor_prefix: vendor_prefix.to_string(),
        }
    }

    /// Channel type required for the given notification kind.
    pub fn channel_type(&self, kind: NotificationKind) -> String {
        format!("{}-{}-app", self.vendor_prefix, kind.as_str())
    }

    /// Whether a channel type satisfies the convention for this kind.
    pub fn matches(&self, kind: NotificationKind, channel_type: &str) -> bool {
        channel_type == self.channel_type(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_convention() {
        let naming = Naming::default();
        assert_eq!(
            naming.channel_type(NotificationKind::Social),
            "pressline-social-app"
        );
        assert!(naming.matches(NotificationKind::Social, "pressline-social-app"));
        assert!(!naming.matches(NotificationKind::Social, "pressline-push-app"));
    }

    #[test]
    fn test_custom_prefix() {
        let naming = Naming::new("acme");
        assert_eq!(
            naming.channel_type(NotificationKind::Syndication),
            "acme-syndication-app"
        );
    }
}
