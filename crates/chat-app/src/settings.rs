use std::path::{Path, PathBuf};
use std::sync::Arc;

use charla_storage::FileStore;
use charla_transport::{
    ChatConfig, ChatTransport, ReqwestHttpClient, SsePushClient, TransportError, TransportResult,
};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "charla";
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const ENV_PREFIX: &str = "CHARLA_";

/// `[chat]` table of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub endpoint: String,
    pub stream_url: Option<String>,
    pub session_id: Option<String>,
    pub welcome_message: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl ChatSection {
    pub fn to_chat_config(&self) -> ChatConfig {
        let mut config = ChatConfig::new(
            &self.api_key,
            &self.role,
            &self.profile,
            &self.endpoint,
        );
        config.stream_url = self.stream_url.clone();
        config.session_id = self.session_id.clone();
        config.welcome_message = self.welcome_message.clone();
        config.timeout_ms = self.timeout_ms;
        config.normalized()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RawSettings {
    #[serde(default)]
    chat: ChatSection,
    history_dir: Option<PathBuf>,
}

/// Validated settings for the terminal driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub chat: ChatConfig,
    pub history_dir: Option<PathBuf>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
    #[snafu(display("invalid settings on `{stage}`: {source}"))]
    Invalid {
        stage: &'static str,
        source: TransportError,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

impl Settings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".charla"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn load() -> SettingsResult<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Reads the TOML file at `path` (a missing file is empty) and overlays `CHARLA_` variables.
    ///
    /// Nested keys use a double underscore: `CHARLA_CHAT__API_KEY` sets `chat.api_key`.
    pub fn load_from(path: &Path) -> SettingsResult<Self> {
        let raw: RawSettings = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })?;

        let chat = raw.chat.to_chat_config();
        chat.validate().context(InvalidSnafu {
            stage: "validate-chat-settings",
        })?;

        tracing::debug!(
            path = ?path,
            endpoint = %chat.endpoint,
            streaming = chat.stream_url.is_some(),
            "loaded settings"
        );

        Ok(Self {
            chat,
            history_dir: raw.history_dir,
        })
    }

    /// Builds the reqwest-backed transport, attaching the SSE client when a stream URL is set.
    pub fn build_transport(&self) -> TransportResult<ChatTransport> {
        let http = ReqwestHttpClient::new(self.chat.timeout())?;
        let transport = ChatTransport::new(self.chat.clone(), Arc::new(http.clone()))?;

        match &self.chat.stream_url {
            Some(stream_url) => {
                tracing::debug!(stream_url = %stream_url, "attaching SSE push client");
                Ok(transport.with_push_client(Arc::new(SsePushClient::new(http))))
            }
            None => Ok(transport),
        }
    }

    pub fn history_root(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(FileStore::default_root)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const SETTINGS: &str = r#"
        history_dir = "state"

        [chat]
        api_key = "k123"
        role = "guest"
        profile = "default"
        endpoint = "http://bff.test/"
    "#;

    #[test]
    fn reads_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, SETTINGS)?;

            let settings = Settings::load_from(Path::new(SETTINGS_FILE_NAME)).unwrap();

            assert_eq!(settings.chat.api_key, "k123");
            assert_eq!(settings.chat.endpoint, "http://bff.test");
            assert_eq!(settings.chat.stream_url, None);
            assert_eq!(settings.history_root(), PathBuf::from("state"));
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, SETTINGS)?;
            jail.set_env("CHARLA_CHAT__ROLE", "admin");
            jail.set_env("CHARLA_CHAT__STREAM_URL", "http://bff.test/api/chat/stream");
            jail.set_env("CHARLA_CHAT__TIMEOUT_MS", "2500");

            let settings = Settings::load_from(Path::new(SETTINGS_FILE_NAME)).unwrap();

            assert_eq!(settings.chat.role, "admin");
            assert_eq!(
                settings.chat.stream_url.as_deref(),
                Some("http://bff.test/api/chat/stream")
            );
            assert_eq!(settings.chat.timeout_ms, Some(2500));
            Ok(())
        });
    }

    #[test]
    fn environment_alone_is_enough() {
        Jail::expect_with(|jail| {
            jail.set_env("CHARLA_CHAT__API_KEY", "k123");
            jail.set_env("CHARLA_CHAT__ROLE", "guest");
            jail.set_env("CHARLA_CHAT__PROFILE", "default");
            jail.set_env("CHARLA_CHAT__ENDPOINT", "http://bff.test");

            let settings = Settings::load_from(Path::new("missing.toml")).unwrap();

            assert_eq!(settings.chat.profile, "default");
            assert_eq!(settings.history_dir, None);
            Ok(())
        });
    }

    #[test]
    fn configured_stream_url_enables_streaming() {
        let chat = ChatConfig::new("k123", "guest", "default", "http://bff.test");
        let rest_only = Settings {
            chat: chat.clone(),
            history_dir: None,
        };
        let streaming = Settings {
            chat: chat.with_stream_url("http://bff.test/api/chat/stream"),
            history_dir: None,
        };

        assert!(!rest_only.build_transport().unwrap().streaming_enabled());
        assert!(streaming.build_transport().unwrap().streaming_enabled());
    }

    #[test]
    fn missing_required_field_is_invalid() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"
                [chat]
                api_key = "k123"
                role = "guest"
                endpoint = "http://bff.test"
                "#,
            )?;

            let error = Settings::load_from(Path::new(SETTINGS_FILE_NAME)).unwrap_err();

            assert!(matches!(
                error,
                SettingsError::Invalid {
                    source: TransportError::InvalidConfig { field: "profile", .. },
                    ..
                }
            ));
            Ok(())
        });
    }

    #[test]
    fn malformed_file_fails_extraction() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, "[chat\napi_key = ")?;

            let error = Settings::load_from(Path::new(SETTINGS_FILE_NAME)).unwrap_err();

            assert!(matches!(error, SettingsError::Extract { .. }));
            Ok(())
        });
    }
}
