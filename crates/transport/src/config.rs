use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{InvalidConfigSnafu, TransportResult};

pub const DEFAULT_WELCOME_MESSAGE: &str = "¡Hola! ¿En qué puedo ayudarte hoy?";

/// Immutable settings for one widget instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    pub api_key: String,
    pub role: String,
    pub profile: String,
    pub endpoint: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ChatConfig {
    /// Creates a normalized config with every optional field unset.
    pub fn new(
        api_key: impl Into<String>,
        role: impl Into<String>,
        profile: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            role: role.into(),
            profile: profile.into(),
            endpoint: endpoint.into(),
            stream_url: None,
            session_id: None,
            welcome_message: None,
            timeout_ms: None,
        }
        .normalized()
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = Some(stream_url.into());
        self.normalized()
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.normalized()
    }

    pub fn with_welcome_message(mut self, welcome_message: impl Into<String>) -> Self {
        self.welcome_message = Some(welcome_message.into());
        self
    }

    /// Trims every field, drops blank optionals and strips trailing slashes from URLs.
    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.role = self.role.trim().to_string();
        self.profile = self.profile.trim().to_string();
        self.endpoint = strip_trailing_slashes(&self.endpoint);
        self.stream_url = non_blank(self.stream_url).map(|url| strip_trailing_slashes(&url));
        self.session_id = non_blank(self.session_id);
        self
    }

    pub fn validate(&self) -> TransportResult<()> {
        for (field, value) in [
            ("apiKey", &self.api_key),
            ("role", &self.role),
            ("profile", &self.profile),
            ("endpoint", &self.endpoint),
        ] {
            ensure!(
                !value.trim().is_empty(),
                InvalidConfigSnafu {
                    stage: "validate-config",
                    field,
                }
            );
        }
        Ok(())
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }

    pub fn health_url(&self) -> String {
        format!("{}/api/health", self.endpoint)
    }

    /// HTTP client timeout; `None` leaves requests unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    pub fn welcome_text(&self) -> &str {
        self.welcome_message
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_WELCOME_MESSAGE)
    }
}

fn strip_trailing_slashes(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;

    #[test]
    fn endpoint_loses_trailing_slashes() {
        let config = ChatConfig::new("k123", "guest", "default", " http://bff.test// ");

        assert_eq!(config.endpoint, "http://bff.test");
        assert_eq!(config.chat_url(), "http://bff.test/api/chat");
        assert_eq!(config.health_url(), "http://bff.test/api/health");
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let config = ChatConfig::new("k123", "  ", "default", "http://bff.test");

        let error = config.validate().unwrap_err();
        assert!(matches!(
            error,
            TransportError::InvalidConfig { field: "role", .. }
        ));
    }

    #[test]
    fn blank_optionals_collapse_to_none() {
        let config = ChatConfig::new("k123", "guest", "default", "http://bff.test")
            .with_stream_url("   ")
            .with_session_id("");

        assert!(config.validate().is_ok());
        assert_eq!(config.stream_url, None);
        assert_eq!(config.session_id, None);
        assert_eq!(config.welcome_text(), DEFAULT_WELCOME_MESSAGE);
    }

    #[test]
    fn deserializes_camel_case_keys() {
        let config: ChatConfig = serde_json::from_str(
            r#"{"apiKey":"k","role":"guest","profile":"default","endpoint":"http://bff.test/","streamUrl":"http://bff.test/api/chat/stream"}"#,
        )
        .unwrap();
        let config = config.normalized();

        assert_eq!(config.api_key, "k");
        assert_eq!(config.endpoint, "http://bff.test");
        assert_eq!(
            config.stream_url.as_deref(),
            Some("http://bff.test/api/chat/stream")
        );
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let mut config = ChatConfig::new("k123", "guest", "default", "http://bff.test");
        assert_eq!(config.timeout(), None);

        config.timeout_ms = Some(0);
        assert_eq!(config.timeout(), None);

        config.timeout_ms = Some(2500);
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
    }
}
