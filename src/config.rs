//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::error::ConfigError;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the local database file.
    pub db_path: PathBuf,
    /// HTTP listen port.
    pub port: u16,
    /// Evening reflection time used when the user has not set one today.
    pub default_reflection_time: NaiveTime,
    /// Interval the client is told to re-poll the routing endpoint at.
    pub poll_interval: Duration,
    /// Base URL for the support chat deep link.
    pub support_chat_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/daybreak.db"),
            port: 8080,
            // Guaranteed-valid literal.
            default_reflection_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            poll_interval: Duration::from_secs(10),
            support_chat_url: "https://t.me/daybreak_support".to_string(),
        }
    }
}

impl AppConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("DAYBREAK_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("DAYBREAK_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DAYBREAK_PORT".to_string(),
                message: format!("not a valid port: {port}"),
            })?;
        }
        if let Ok(time) = std::env::var("DAYBREAK_REFLECTION_TIME") {
            config.default_reflection_time = NaiveTime::parse_from_str(&time, "%H:%M")
                .map_err(|_| ConfigError::InvalidValue {
                    key: "DAYBREAK_REFLECTION_TIME".to_string(),
                    message: format!("expected HH:MM, got {time}"),
                })?;
        }
        if let Ok(secs) = std::env::var("DAYBREAK_POLL_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DAYBREAK_POLL_INTERVAL_SECS".to_string(),
                message: format!("not a number: {secs}"),
            })?;
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Ok(url) = std::env::var("DAYBREAK_SUPPORT_CHAT_URL") {
            config.support_chat_url = url;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reflection_time_is_six_pm() {
        let config = AppConfig::default();
        assert_eq!(config.default_reflection_time.format("%H:%M").to_string(), "18:00");
    }

    #[test]
    fn default_poll_interval() {
        assert_eq!(AppConfig::default().poll_interval, Duration::from_secs(10));
    }
}
