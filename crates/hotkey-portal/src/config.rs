use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default id of the single shortcut this application binds through the portal
pub const DEFAULT_SHORTCUT_ID: &str = "toggle-recording";
pub const DEFAULT_SHORTCUT_DESCRIPTION: &str = "Toggle recording";
/// Default prefix for request and session handle tokens
pub const DEFAULT_TOKEN_PREFIX: &str = "hotkey";
/// Portal dialogs wait on the user, so the default bound is generous
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Settings for the GlobalShortcuts portal client and the hotkey manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Id of the shortcut bound through the portal
    pub shortcut_id: String,
    /// Human-readable description shown in the portal's shortcut dialog
    pub shortcut_description: String,
    /// Prefix for generated handle tokens
    pub token_prefix: String,
    /// How long to wait for a portal response; `None` waits forever
    pub request_timeout_ms: Option<u64>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            shortcut_id: DEFAULT_SHORTCUT_ID.to_string(),
            shortcut_description: DEFAULT_SHORTCUT_DESCRIPTION.to_string(),
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl PortalConfig {
    pub fn with_shortcut(mut self, id: impl Into<String>, description: impl Into<String>) -> Self {
        self.shortcut_id = id.into();
        self.shortcut_description = description.into();
        self
    }

    pub fn with_token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.token_prefix = prefix.into();
        self
    }

    /// Set the response timeout, kept at millisecond precision. A non-zero
    /// timeout never becomes zero.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout
            .map(|t| u64::try_from(t.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX));
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PortalConfig::default();
        assert_eq!(config.shortcut_id, "toggle-recording");
        assert_eq!(config.shortcut_description, "Toggle recording");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PortalConfig =
            serde_json::from_str(r#"{"shortcut_id": "dictate", "request_timeout_ms": null}"#)
                .unwrap();
        assert_eq!(config.shortcut_id, "dictate");
        assert_eq!(config.token_prefix, "hotkey");
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_timeout_keeps_milliseconds() {
        let config = PortalConfig::default().with_request_timeout(Some(Duration::from_millis(20)));
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(20)));

        let config = config.with_request_timeout(Some(Duration::from_millis(1500)));
        assert_eq!(config.request_timeout_ms, Some(1500));
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(1500)));

        let config = config.with_request_timeout(Some(Duration::from_micros(300)));
        assert_eq!(config.request_timeout_ms, Some(1));

        let config = config.with_request_timeout(None);
        assert_eq!(config.request_timeout(), None);
    }
}
