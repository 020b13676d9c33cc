//! Runtime configuration: `config.toml`, then environment, then CLI flags.
//!
//! ```toml
//! [telegram]
//! bot_token = "123:abc"
//! poll_timeout_secs = 30
//!
//! [afk]
//! mode = "auto_return"          # or "passive"
//! data_file = "/var/lib/afkwatch/afk_data.json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `telegram.bot_token`.
pub const TOKEN_ENV: &str = "AFKWATCH_BOT_TOKEN";

const DATA_FILE_NAME: &str = "afk_data.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no bot token: set telegram.bot_token, {TOKEN_ENV}, or pass --token")]
    MissingToken,
}

/// How the bot treats a message from a user who is currently AFK.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Sending a message does not change the sender's AFK status.
    #[default]
    Passive,
    /// The sender's next plain message ends their AFK and gets a welcome back.
    AutoReturn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub afk: AfkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            poll_timeout_secs: default_poll_timeout_secs(),
            api_base: default_api_base(),
        }
    }
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AfkConfig {
    #[serde(default)]
    pub mode: NotifyMode,
    /// Where AFK state is saved. Defaults to the platform data directory.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
}

/// `<config dir>/afkwatch/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "afkwatch").map(|d| d.config_dir().join("config.toml"))
}

fn default_data_file() -> PathBuf {
    directories::ProjectDirs::from("", "", "afkwatch")
        .map(|d| d.data_dir().join(DATA_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_FILE_NAME))
}

impl Config {
    /// Load from `explicit` (must exist) or the default location (may be
    /// absent, giving defaults), then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("no config file; using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(std::env::var(TOKEN_ENV).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse TOML, warning about keys this version does not understand.
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(raw)?;
        serde_ignored::deserialize(toml::Value::Table(table), |path| {
            tracing::warn!("ignoring unknown config key: {path}");
        })
    }

    fn apply_env(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = Some(token);
        }
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.telegram
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    pub fn data_file(&self) -> PathBuf {
        self.afk.data_file.clone().unwrap_or_else(default_data_file)
    }
}
