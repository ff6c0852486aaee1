//! Configuration loading and validation.
//!
//! Values come from an optional TOML file, then environment variables, then
//! defaults. The resolved [`Config`] is handed to constructors at startup;
//! nothing below `main` reads the environment.

use crate::error::{ConfigError, Result};

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of prior messages fed back as context.
pub const DEFAULT_CONTEXT_LIMIT: i64 = 50;

/// Relaybot configuration.
#[derive(Clone)]
pub struct Config {
    /// Data directory path.
    pub data_dir: PathBuf,

    /// sqlx connection URL for the message store.
    pub database_url: String,

    /// How many prior messages to include as context.
    pub context_limit: i64,

    /// Chat platform settings.
    pub telegram: TelegramConfig,

    /// Completion API settings.
    pub completion: CompletionConfig,

    /// Webhook transport settings.
    pub webhook: WebhookConfig,

    /// Directory for rolling log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

/// Telegram Bot API settings.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token (secret).
    pub token: String,

    /// Base URL of the Bot API.
    pub api_url: String,

    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

/// Generative-language API settings.
#[derive(Clone)]
pub struct CompletionConfig {
    /// API key (secret).
    pub api_key: String,

    /// Scheme and host, without trailing slash.
    pub base_url: String,

    /// API version path segment.
    pub api_version: String,

    /// Model name.
    pub model: String,

    /// Global request timeout.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_version: "v1beta".into(),
            model: "gemini-2.0-flash".into(),
            timeout_secs: 60,
        }
    }
}

/// Webhook transport settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Local address the HTTP server binds to.
    pub bind: SocketAddr,

    /// Public base URL. When set, the webhook is registered at startup.
    pub public_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            public_url: None,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("database_url", &self.database_url)
            .field("context_limit", &self.context_limit)
            .field("telegram", &self.telegram)
            .field("completion", &self.completion)
            .field("webhook", &self.webhook)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// On-disk shape of `relaybot.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    data_dir: Option<PathBuf>,
    database_url: Option<String>,
    context_limit: Option<i64>,
    telegram_token: Option<String>,
    telegram_api_url: Option<String>,
    poll_timeout_secs: Option<u64>,
    log_dir: Option<PathBuf>,
    #[serde(default)]
    completion: TomlCompletion,
    #[serde(default)]
    webhook: TomlWebhook,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlCompletion {
    api_key: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlWebhook {
    bind: Option<String>,
    public_url: Option<String>,
}

impl Config {
    /// Load configuration from the environment only.
    pub fn load() -> Result<Self> {
        Self::resolve(TomlConfig::default(), |key| std::env::var(key).ok())
    }

    /// Load from a TOML file, with environment variables taking precedence.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(source),
        })?;
        Self::from_toml_str(&raw, path, |key| std::env::var(key).ok())
    }

    fn from_toml_str(
        raw: &str,
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file: TomlConfig = toml::from_str(raw).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Self::resolve(file, env)
    }

    fn resolve(file: TomlConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = file.data_dir.unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("relaybot"))
                .unwrap_or_else(|| PathBuf::from("./data"))
        });

        let telegram_token = env("RELAYBOT_TELEGRAM_TOKEN")
            .or(file.telegram_token)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey("telegram_token".into()))?;

        let defaults = CompletionConfig::default();
        let completion = CompletionConfig {
            api_key: env("RELAYBOT_API_KEY")
                .or(file.completion.api_key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingKey("completion.api_key".into()))?,
            base_url: file
                .completion
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_version: file.completion.api_version.unwrap_or(defaults.api_version),
            model: env("RELAYBOT_MODEL")
                .or(file.completion.model)
                .unwrap_or(defaults.model),
            timeout_secs: file.completion.timeout_secs.unwrap_or(defaults.timeout_secs),
        };
        if completion.timeout_secs == 0 {
            return Err(ConfigError::Invalid("completion.timeout_secs must be positive".into()).into());
        }

        let context_limit = match env("RELAYBOT_CONTEXT_LIMIT") {
            Some(value) => value.trim().parse::<i64>().map_err(|_| {
                ConfigError::Invalid(format!("RELAYBOT_CONTEXT_LIMIT is not a number: {value}"))
            })?,
            None => file.context_limit.unwrap_or(DEFAULT_CONTEXT_LIMIT),
        };
        if context_limit <= 0 {
            return Err(ConfigError::Invalid("context_limit must be positive".into()).into());
        }

        let database_url = env("RELAYBOT_DATABASE_URL")
            .or(file.database_url)
            .unwrap_or_else(|| default_database_url(&data_dir));

        let default_webhook = WebhookConfig::default();
        let bind = match env("RELAYBOT_BIND").or(file.webhook.bind) {
            Some(value) => value.parse::<SocketAddr>().map_err(|_| {
                ConfigError::Invalid(format!("webhook bind address is invalid: {value}"))
            })?,
            None => default_webhook.bind,
        };
        let webhook = WebhookConfig {
            bind,
            public_url: env("RELAYBOT_PUBLIC_URL")
                .or(file.webhook.public_url)
                .filter(|value| !value.trim().is_empty()),
        };

        let telegram = TelegramConfig {
            token: telegram_token,
            api_url: file
                .telegram_api_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.telegram.org".into()),
            poll_timeout_secs: file.poll_timeout_secs.unwrap_or(30),
        };

        Ok(Self {
            data_dir,
            database_url,
            context_limit,
            telegram,
            completion,
            webhook,
            log_dir: file.log_dir,
        })
    }

    /// Ensure the data directory exists when the default SQLite file lives there.
    ///
    /// An overridden `database_url` leaves the filesystem untouched.
    pub fn ensure_data_dir(&self) -> Result<()> {
        if self.database_url != default_database_url(&self.data_dir) {
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::Load {
            path: self.data_dir.display().to_string(),
            source: Arc::new(source),
        })?;
        Ok(())
    }
}

fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("relaybot.db").display())
}
