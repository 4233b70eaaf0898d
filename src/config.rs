//! Process configuration
//!
//! Everything is read once from the environment at startup. Missing or
//! malformed required values abort the process before any update is polled.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_STT_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_STT_MODEL: &str = "whisper-1";
pub const DEFAULT_STT_LANGUAGE: &str = "ru";
const DEFAULT_TESTS_PATH: &str = "tests.json";
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("ADMINS must list at least one user id")]
    NoAdmins,
    #[error("ffmpeg not found on PATH; set FFMPEG_PATH")]
    FfmpegNotFound,
}

/// Telegram-side settings
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
    pub poll_timeout: Duration,
}

/// Speech service settings
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: String,
}

/// User ids allowed to talk to the bot
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    admins: HashSet<i64>,
}

impl AccessList {
    #[cfg(test)]
    pub fn new(admins: impl IntoIterator<Item = i64>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn allows(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    /// Parse a comma separated id list, ignoring blank entries
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut admins = HashSet::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id = part.parse::<i64>().map_err(|_| ConfigError::Invalid {
                var: "ADMINS",
                value: part.to_string(),
            })?;
            admins.insert(id);
        }
        if admins.is_empty() {
            return Err(ConfigError::NoAdmins);
        }
        Ok(Self { admins })
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    pub access: AccessList,
    pub catalog_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub speech: SpeechConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = non_empty("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let access = AccessList::parse(&non_empty("ADMINS").ok_or(ConfigError::Missing("ADMINS"))?)?;

        let poll_timeout = match non_empty("POLL_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "POLL_TIMEOUT_SECS",
                value: raw,
            })?,
            None => DEFAULT_POLL_TIMEOUT_SECS,
        };

        let ffmpeg_path = match non_empty("FFMPEG_PATH") {
            Some(path) => PathBuf::from(path),
            None => which::which("ffmpeg").map_err(|_| ConfigError::FfmpegNotFound)?,
        };

        Ok(Self {
            telegram: TelegramConfig {
                bot_token,
                api_url: non_empty("TELEGRAM_API_URL")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
                poll_timeout: Duration::from_secs(poll_timeout),
            },
            access,
            catalog_path: PathBuf::from(
                non_empty("TESTS_PATH").unwrap_or_else(|| DEFAULT_TESTS_PATH.to_string()),
            ),
            ffmpeg_path,
            speech: SpeechConfig {
                endpoint: non_empty("STT_URL").unwrap_or_else(|| DEFAULT_STT_URL.to_string()),
                api_key: non_empty("STT_API_KEY"),
                model: non_empty("STT_MODEL").unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
                language: non_empty("STT_LANGUAGE")
                    .unwrap_or_else(|| DEFAULT_STT_LANGUAGE.to_string()),
            },
        })
    }
}
