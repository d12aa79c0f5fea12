//! Application settings: Telegram credentials, store connection, gate policy.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Bot token (obtain from @BotFather).
    pub bot_token: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("filegate.session")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String, bot_token: String) -> Self {
        Self {
            api_id,
            api_hash,
            bot_token,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TG_API_ID`, `TG_API_HASH` and `BOT_TOKEN` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id: i32 = std::env::var("TG_API_ID")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TG_API_ID"))?;

        let api_hash = std::env::var("TG_API_HASH")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_HASH"))?;

        let bot_token =
            std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let session_path =
            std::env::var("TG_SESSION_PATH").map_or_else(|_| default_session_path(), PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            session_path,
        })
    }
}

/// Document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// MongoDB connection URI.
    pub uri: String,

    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "filegate".to_owned()
}

impl StoreConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `MONGO_URI` to be set; `MONGO_DATABASE` defaults to `filegate`.
    ///
    /// # Errors
    ///
    /// Returns an error if `MONGO_URI` is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let uri =
            std::env::var("MONGO_URI").map_err(|_| ConfigError::MissingEnvVar("MONGO_URI"))?;
        let database = std::env::var("MONGO_DATABASE").unwrap_or_else(|_| default_database());

        Ok(Self { uri, database })
    }
}

/// Gate policy and channel wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    /// Bot username, used to build `t.me` deep links.
    pub bot_username: String,

    /// Private channel where submitted files are archived.
    pub archive_channel_id: i64,

    /// Channel the user must join to be exempt from token gating.
    pub force_sub_channel_id: i64,

    /// Public invite link shown to non-members.
    pub force_sub_link: String,

    /// User ids exempt from all gating.
    #[serde(default)]
    pub owner_ids: HashSet<i64>,

    /// Access token lifetime in hours.
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    /// File lease lifetime in hours, also the renewal window added on serve.
    #[serde(default = "default_lease_duration_hours")]
    pub lease_duration_hours: i64,

    /// Interval between sweeper runs in hours.
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: i64,

    /// Grace period after lease expiry before the sweeper reclaims it.
    #[serde(default = "default_sweep_grace_hours")]
    pub sweep_grace_hours: i64,

    /// Minimum interval between file sends in seconds (rate limit protection).
    #[serde(default = "default_min_send_interval")]
    pub min_send_interval_secs: u64,
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_lease_duration_hours() -> i64 {
    2
}

fn default_sweep_interval_hours() -> i64 {
    1
}

fn default_sweep_grace_hours() -> i64 {
    1
}

fn default_min_send_interval() -> u64 {
    1
}

impl GateSettings {
    /// Creates gate settings from environment variables.
    ///
    /// Required: `BOT_USERNAME`, `ARCHIVE_CHANNEL_ID`, `FORCE_SUB_CHANNEL_ID`
    /// and `FORCE_SUB_LINK`. Policy durations fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_username = std::env::var("BOT_USERNAME")
            .map_err(|_| ConfigError::MissingEnvVar("BOT_USERNAME"))?;

        let archive_channel_id: i64 = std::env::var("ARCHIVE_CHANNEL_ID")
            .map_err(|_| ConfigError::MissingEnvVar("ARCHIVE_CHANNEL_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidValue("ARCHIVE_CHANNEL_ID"))?;

        let force_sub_channel_id: i64 = std::env::var("FORCE_SUB_CHANNEL_ID")
            .map_err(|_| ConfigError::MissingEnvVar("FORCE_SUB_CHANNEL_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidValue("FORCE_SUB_CHANNEL_ID"))?;

        let force_sub_link = std::env::var("FORCE_SUB_LINK")
            .map_err(|_| ConfigError::MissingEnvVar("FORCE_SUB_LINK"))?;

        let owner_ids = match std::env::var("OWNER_IDS") {
            Ok(raw) => parse_owner_ids(&raw).ok_or(ConfigError::InvalidValue("OWNER_IDS"))?,
            Err(_) => HashSet::new(),
        };

        Ok(Self {
            bot_username,
            archive_channel_id,
            force_sub_channel_id,
            force_sub_link,
            owner_ids,
            token_ttl_hours: env_hours("TOKEN_TTL_HOURS", default_token_ttl_hours()),
            lease_duration_hours: env_hours("LEASE_DURATION_HOURS", default_lease_duration_hours()),
            sweep_interval_hours: env_hours("SWEEP_INTERVAL_HOURS", default_sweep_interval_hours()),
            sweep_grace_hours: env_hours("SWEEP_GRACE_HOURS", default_sweep_grace_hours()),
            min_send_interval_secs: std::env::var("MIN_SEND_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_min_send_interval),
        })
    }

    /// Access token lifetime.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours)
    }

    /// File lease lifetime.
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        Duration::hours(self.lease_duration_hours)
    }

    /// Grace period between lease lapse and reclaim.
    #[must_use]
    pub fn sweep_grace(&self) -> Duration {
        Duration::hours(self.sweep_grace_hours)
    }

    /// Sweeper cadence, as a std duration for the timer.
    #[must_use]
    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_hours.unsigned_abs() * 3600)
    }
}

fn env_hours(var: &str, default: i64) -> i64 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|h| *h > 0)
        .unwrap_or(default)
}

/// Parses a comma-separated list of user ids.
///
/// Returns `None` if any entry fails to parse.
fn parse_owner_ids(raw: &str) -> Option<HashSet<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().ok())
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> GateSettings {
        GateSettings {
            bot_username: "filegate_bot".to_owned(),
            archive_channel_id: -1001,
            force_sub_channel_id: -1002,
            force_sub_link: "https://t.me/some_channel".to_owned(),
            owner_ids: HashSet::new(),
            token_ttl_hours: default_token_ttl_hours(),
            lease_duration_hours: default_lease_duration_hours(),
            sweep_interval_hours: default_sweep_interval_hours(),
            sweep_grace_hours: default_sweep_grace_hours(),
            min_send_interval_secs: default_min_send_interval(),
        }
    }

    #[test]
    fn test_policy_defaults() {
        let settings = test_settings();
        assert_eq!(settings.token_ttl(), Duration::hours(24));
        assert_eq!(settings.lease_duration(), Duration::hours(2));
        assert_eq!(settings.sweep_grace(), Duration::hours(1));
        assert_eq!(settings.sweep_interval(), StdDuration::from_secs(3600));
    }

    #[test]
    fn test_parse_owner_ids() {
        let ids = parse_owner_ids("1, 42,1001").unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&42));

        assert_eq!(parse_owner_ids("").map(|s| s.len()), Some(0));
        assert!(parse_owner_ids("7, not-a-number").is_none());
    }

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned(), "123:token".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("filegate.session"));
    }
}
