use crate::{alerter::RetryPolicy, storage::StoreBackend};
use std::{env, num::ParseIntError, path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_FEED_URL: &str = "https://www.githubstatus.com/api/v2/incidents/unresolved.json";
pub const DEFAULT_PAGE_URL: &str = "https://www.githubstatus.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierConfig {
    Webhook {
        url: String,
    },
    Telegram {
        bot_token: String,
        chat_id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub feed_url: String,
    /// Link appended to alerts when the feed does not advertise its page.
    pub page_url: String,
    pub store_backend: StoreBackend,
    pub store_path: PathBuf,
    pub notifier: NotifierConfig,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    /// Evaluate a single cycle and exit, for use under an external scheduler.
    pub run_once: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing env var: {0}")]
    MissingEnv(String),
    #[error("invalid integer in env var {name}: {source}")]
    InvalidInteger { name: String, source: ParseIntError },
    #[error("invalid value in env var {name}: {value}")]
    InvalidValue { name: String, value: String },
    #[error("no notifier configured: set STATUS_WATCH_WEBHOOK_URL or STATUS_WATCH_TELEGRAM_BOT_TOKEN")]
    MissingNotifier,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let feed_url = read("STATUS_WATCH_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_owned());
        let page_url = read("STATUS_WATCH_PAGE_URL").unwrap_or_else(|| DEFAULT_PAGE_URL.to_owned());

        let store_backend = match read("STATUS_WATCH_STORE") {
            Some(raw) => StoreBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                name: "STATUS_WATCH_STORE".to_owned(),
                value: raw,
            })?,
            None => StoreBackend::Sqlite,
        };
        let store_path = PathBuf::from(
            read("STATUS_WATCH_STORE_PATH")
                .unwrap_or_else(|| store_backend.default_path().to_owned()),
        );

        let notifier = read_notifier(&read)?;

        let poll_seconds = read_positive_u64(&read, "STATUS_WATCH_POLL_SECONDS")?.unwrap_or(300);
        let http_timeout_seconds =
            read_positive_u64(&read, "STATUS_WATCH_HTTP_TIMEOUT_SECONDS")?.unwrap_or(10);

        let defaults = RetryPolicy::default();
        let retry_max = read("STATUS_WATCH_NOTIFY_RETRY_MAX")
            .map(|raw| {
                raw.trim().parse::<u8>().map_err(|source| ConfigError::InvalidInteger {
                    name: "STATUS_WATCH_NOTIFY_RETRY_MAX".to_owned(),
                    source,
                })
            })
            .transpose()?
            .unwrap_or(defaults.max_attempts);
        let retry_delay = read_u64(&read, "STATUS_WATCH_NOTIFY_RETRY_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay);

        let run_once = match read("STATUS_WATCH_RUN_ONCE") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue {
                name: "STATUS_WATCH_RUN_ONCE".to_owned(),
                value: raw,
            })?,
            None => false,
        };

        Ok(Self {
            feed_url,
            page_url,
            store_backend,
            store_path,
            notifier,
            poll_interval: Duration::from_secs(poll_seconds),
            http_timeout: Duration::from_secs(http_timeout_seconds),
            retry: RetryPolicy {
                max_attempts: retry_max,
                initial_delay: retry_delay,
            },
            run_once,
        })
    }
}

fn read_notifier(read: &impl Fn(&str) -> Option<String>) -> Result<NotifierConfig, ConfigError> {
    if let Some(url) = read("STATUS_WATCH_WEBHOOK_URL") {
        return Ok(NotifierConfig::Webhook { url });
    }

    let Some(bot_token) = read("STATUS_WATCH_TELEGRAM_BOT_TOKEN") else {
        return Err(ConfigError::MissingNotifier);
    };
    let raw_chat_id = read("STATUS_WATCH_TELEGRAM_CHAT_ID")
        .ok_or_else(|| ConfigError::MissingEnv("STATUS_WATCH_TELEGRAM_CHAT_ID".to_owned()))?;
    let chat_id = raw_chat_id
        .trim()
        .parse::<i64>()
        .map_err(|source| ConfigError::InvalidInteger {
            name: "STATUS_WATCH_TELEGRAM_CHAT_ID".to_owned(),
            source,
        })?;

    Ok(NotifierConfig::Telegram { bot_token, chat_id })
}

fn read_u64(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    read(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|source| ConfigError::InvalidInteger {
                name: name.to_owned(),
                source,
            })
        })
        .transpose()
}

/// Like [`read_u64`], but zero is rejected.
fn read_positive_u64(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    match read_u64(read, name)? {
        Some(0) => Err(ConfigError::InvalidValue {
            name: name.to_owned(),
            value: "0".to_owned(),
        }),
        value => Ok(value),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
