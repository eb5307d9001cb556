//! Configuration management

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::domain::ratelimit::RateLimiterOpts;
use crate::infrastructure::llm::LLMConfig;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub telegram: TelegramConfig,
    pub llm: LLMConfig,
    pub rate_limit: RateLimitConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    /// Reply to `/about`
    pub about: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub poll_timeout_seconds: u64,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    /// Requests per second per user, also the per-user burst
    pub per_user_limit: u32,
    /// Requests per second for everybody, also the global burst
    pub global_limit: u32,
    /// Users tracked at once before the least recent is forgotten; 0 means no bound
    pub max_tracked_users: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DispatchConfig {
    /// Deadline for admitting one message
    pub timeout_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "ole-bot".to_string(),
            prefix: "/".to_string(),
            about: "Ask the bot owner for anything else.".to_string(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            poll_timeout_seconds: 60,
            debug: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_user_limit: 1,
            global_limit: 5,
            max_tracked_users: 10_000,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_ms: 500 }
    }
}

impl RateLimitConfig {
    pub fn opts(&self) -> RateLimiterOpts {
        RateLimiterOpts {
            per_user_limit: self.per_user_limit,
            global_limit: self.global_limit,
            max_tracked_users: NonZeroUsize::new(self.max_tracked_users),
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults, then the YAML file when it exists, then `.env` and process
    /// environment overrides.
    pub fn load_layered(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        match dotenvy::dotenv() {
            Ok(env_path) => tracing::debug!("Loaded environment from {}", env_path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::Parse(format!("Failed to read .env: {}", e))),
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(token) = std::env::var("TG_TOKEN").or_else(|_| std::env::var("BOT_TOKEN")) {
            self.telegram.token = Some(token);
        }
        if let Ok(about) = std::env::var("BOT_ABOUT") {
            self.bot.about = about;
        }
        if let Some(limit) = parse_env("PER_USER_LIMIT")? {
            self.rate_limit.per_user_limit = limit;
        }
        if let Some(limit) = parse_env("GLOBAL_LIMIT")? {
            self.rate_limit.global_limit = limit;
        }
        if let Some(timeout) = parse_env("DISPATCH_TIMEOUT_MS")? {
            self.dispatch.timeout_ms = timeout;
        }

        self.llm.apply_env();
        Ok(())
    }

    /// Zero rate limits are valid and lock the chat command out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.is_empty() {
            return Err(ConfigError::MissingField("bot.prefix".to_string()));
        }
        if self.telegram.poll_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "telegram.poll-timeout-seconds must be positive".to_string(),
            ));
        }
        if self.rate_limit.per_user_limit == 0 || self.rate_limit.global_limit == 0 {
            tracing::warn!("A rate limit is zero: chat requests will never be admitted");
        }
        self.llm.validate()
    }
}
