use crate::engine::EngineConfig;
use crate::error::AppError;
use crate::storage::json_store;
use crate::telegram::DEFAULT_API_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "TASKEBB_CONFIG_PATH";
const BOT_TOKEN_ENV_VAR: &str = "TASKEBB_BOT_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: Option<String>,
    pub api_base_url: String,
    pub store_path: Option<PathBuf>,
    pub poll_timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub reminder_period_secs: u64,
    pub shutdown_grace_ms: u64,
    pub prune_completed: bool,
    pub desktop_notifications: bool,
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            store_path: None,
            poll_timeout_secs: 20,
            retry_delay_ms: 2000,
            reminder_period_secs: 60,
            shutdown_grace_ms: 500,
            prune_completed: true,
            desktop_notifications: false,
            log_filter: None,
        }
    }
}

impl Config {
    /// Explicit `store_path`, else `TASKEBB_STORE_PATH`, else the per-user
    /// default.
    pub fn store_path(&self) -> Result<PathBuf, AppError> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => json_store::store_path(),
        }
    }

    /// The bot token, required by anything that talks to the chat service.
    pub fn require_bot_token(&self) -> Result<&str, AppError> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::invalid_input(format!(
                    "bot token is not configured (set {BOT_TOKEN_ENV_VAR} or bot_token)"
                ))
            })
    }

    pub fn engine_config(&self) -> Result<EngineConfig, AppError> {
        if self.reminder_period_secs == 0 {
            return Err(AppError::invalid_data(
                "reminder_period_secs must be greater than zero",
            ));
        }
        if self.poll_timeout_secs == 0 {
            return Err(AppError::invalid_data(
                "poll_timeout_secs must be greater than zero",
            ));
        }

        Ok(EngineConfig {
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            reminder_period: Duration::from_secs(self.reminder_period_secs),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            prune_completed: self.prune_completed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

/// Scalar keys that may be overridden from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BotToken,
    ApiBaseUrl,
    StorePath,
    PollTimeoutSecs,
    RetryDelayMs,
    ReminderPeriodSecs,
    ShutdownGraceMs,
    PruneCompleted,
    DesktopNotifications,
    LogFilter,
}

impl ConfigKey {
    /// Resolves an already canonicalized (lowercase, underscore separated)
    /// key name.
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name {
            "bot_token" | "token" => ConfigKey::BotToken,
            "api_base_url" => ConfigKey::ApiBaseUrl,
            "store_path" | "store" => ConfigKey::StorePath,
            "poll_timeout_secs" => ConfigKey::PollTimeoutSecs,
            "retry_delay_ms" => ConfigKey::RetryDelayMs,
            "reminder_period_secs" => ConfigKey::ReminderPeriodSecs,
            "shutdown_grace_ms" => ConfigKey::ShutdownGraceMs,
            "prune_completed" => ConfigKey::PruneCompleted,
            "desktop_notifications" => ConfigKey::DesktopNotifications,
            "log_filter" => ConfigKey::LogFilter,
            _ => return None,
        };
        Some(key)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
    pub api_base_url: Option<String>,
    pub store_path: Option<PathBuf>,
    pub poll_timeout_secs: Option<u64>,
    pub retry_delay_ms: Option<u64>,
    pub reminder_period_secs: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub prune_completed: Option<bool>,
    pub desktop_notifications: Option<bool>,
    pub log_filter: Option<String>,
}

impl ConfigOverrides {
    /// Parses `value` for `key` and records it; a later call for the same key
    /// wins.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), AppError> {
        let value = value.trim();
        match key {
            ConfigKey::BotToken => self.bot_token = Some(value.to_string()),
            ConfigKey::ApiBaseUrl => self.api_base_url = Some(value.to_string()),
            ConfigKey::StorePath => self.store_path = Some(PathBuf::from(value)),
            ConfigKey::PollTimeoutSecs => self.poll_timeout_secs = Some(parse_number(key, value)?),
            ConfigKey::RetryDelayMs => self.retry_delay_ms = Some(parse_number(key, value)?),
            ConfigKey::ReminderPeriodSecs => {
                self.reminder_period_secs = Some(parse_number(key, value)?)
            }
            ConfigKey::ShutdownGraceMs => self.shutdown_grace_ms = Some(parse_number(key, value)?),
            ConfigKey::PruneCompleted => self.prune_completed = Some(parse_flag(key, value)?),
            ConfigKey::DesktopNotifications => {
                self.desktop_notifications = Some(parse_flag(key, value)?)
            }
            ConfigKey::LogFilter => self.log_filter = Some(value.to_string()),
        }
        Ok(())
    }
}

fn parse_number(key: ConfigKey, value: &str) -> Result<u64, AppError> {
    value.parse().map_err(|_| {
        AppError::invalid_input(format!("{key:?} expects a whole number, got '{value}'"))
    })
}

fn parse_flag(key: ConfigKey, value: &str) -> Result<bool, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(AppError::invalid_input(format!(
            "{key:?} expects true or false, got '{value}'"
        ))),
    }
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("taskebb")
            .join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("taskebb")
            .join(CONFIG_FILE_NAME))
    }
}

/// Loads the config file, falling back to defaults when it is missing or
/// unreadable. The failure, if any, is returned alongside for reporting.
pub fn load_config_with_fallback() -> ConfigLoad {
    let load = match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    };

    ConfigLoad {
        config: apply_env(load.config),
        error: load.error,
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })
}

fn apply_env(mut config: Config) -> Config {
    if let Ok(token) = std::env::var(BOT_TOKEN_ENV_VAR)
        && !token.trim().is_empty()
    {
        config.bot_token = Some(token.trim().to_string());
    }
    config
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();

    if let Some(token) = overrides.bot_token.as_ref() {
        merged.bot_token = Some(token.clone());
    }
    if let Some(url) = overrides.api_base_url.as_ref() {
        merged.api_base_url = url.clone();
    }
    if let Some(path) = overrides.store_path.as_ref() {
        merged.store_path = Some(path.clone());
    }
    if let Some(filter) = overrides.log_filter.as_ref() {
        merged.log_filter = Some(filter.clone());
    }
    merged.poll_timeout_secs = overrides.poll_timeout_secs.unwrap_or(merged.poll_timeout_secs);
    merged.retry_delay_ms = overrides.retry_delay_ms.unwrap_or(merged.retry_delay_ms);
    merged.reminder_period_secs = overrides
        .reminder_period_secs
        .unwrap_or(merged.reminder_period_secs);
    merged.shutdown_grace_ms = overrides.shutdown_grace_ms.unwrap_or(merged.shutdown_grace_ms);
    merged.prune_completed = overrides.prune_completed.unwrap_or(merged.prune_completed);
    merged.desktop_notifications = overrides
        .desktop_notifications
        .unwrap_or(merged.desktop_notifications);

    merged
}
