use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RelayError;

pub const DEFAULT_MODEL: &str = "gryphe/mythomax-l2-13b";

/// Fully resolved configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub openrouter: OpenRouterConfig,
    pub polling: PollingConfig,
    /// Thread replies under the message that prompted them.
    pub reply_to_message: bool,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Sent as `HTTP-Referer`; OpenRouter uses it to identify the app.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Long-poll timeout passed to getUpdates.
    pub timeout_secs: u64,
    /// Pause after a failed fetch before the same offset is requested again.
    pub retry_delay_secs: u64,
    /// Pause after every processed batch.
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_delay_secs: 5,
            interval_secs: 1,
        }
    }
}

impl PollingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// On-disk shape of `config.json`. Every key is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    telegram_token: String,
    openrouter_key: String,
    openrouter_model: String,
    telegram_api_url: Option<String>,
    reply_to_message: bool,
    polling: PollingConfig,
    openrouter: FileOpenRouter,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileOpenRouter {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    referer: Option<String>,
    title: Option<String>,
}

/// Values taken from `TELEGRAM_TOKEN`, `OPENROUTER_KEY` and `OPENROUTER_MODEL`.
/// Empty variables count as unset.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub telegram_token: Option<String>,
    pub openrouter_key: Option<String>,
    pub openrouter_model: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        fn non_empty(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        Self {
            telegram_token: non_empty("TELEGRAM_TOKEN"),
            openrouter_key: non_empty("OPENROUTER_KEY"),
            openrouter_model: non_empty("OPENROUTER_MODEL"),
        }
    }
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_referer() -> String {
    "https://github.com/my-telegram-bot".to_string()
}

fn default_title() -> String {
    "Telegram AI Bot".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        Self::load_from(path, &EnvOverrides::from_env())
    }

    /// Read the optional config file, then apply environment overrides.
    ///
    /// A missing or unparsable file is not fatal; only an empty token or key
    /// after the merge is.
    pub fn load_from(path: &Path, env: &EnvOverrides) -> Result<Self, RelayError> {
        let file = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<FileConfig>(&content) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    FileConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using environment only", path.display());
                FileConfig::default()
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                FileConfig::default()
            }
        };

        Self::resolve(file, env)
    }

    fn resolve(file: FileConfig, env: &EnvOverrides) -> Result<Self, RelayError> {
        let bot_token = env.telegram_token.clone().unwrap_or(file.telegram_token);
        let api_key = env.openrouter_key.clone().unwrap_or(file.openrouter_key);
        let model = env
            .openrouter_model
            .clone()
            .unwrap_or(file.openrouter_model);

        if bot_token.is_empty() || api_key.is_empty() {
            return Err(RelayError::Config(
                "telegram_token and openrouter_key are required (config file or \
                 TELEGRAM_TOKEN / OPENROUTER_KEY)"
                    .to_string(),
            ));
        }

        let model = if model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            model
        };

        let or = file.openrouter;
        Ok(Config {
            telegram: TelegramConfig {
                bot_token,
                api_url: trim_url(file.telegram_api_url.unwrap_or_else(default_telegram_api_url)),
            },
            openrouter: OpenRouterConfig {
                api_key,
                model,
                base_url: trim_url(or.base_url.unwrap_or_else(default_openrouter_base_url)),
                timeout_secs: or.timeout_secs.unwrap_or(60),
                referer: or.referer.unwrap_or_else(default_referer),
                title: or.title.unwrap_or_else(default_title),
            },
            polling: file.polling,
            reply_to_message: file.reply_to_message,
        })
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
