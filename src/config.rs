//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. JSON configuration file (path from `CHATWARDEN_CONFIG`, default `config.json`)
//! 3. Environment variables (CHATWARDEN__*, override)

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Platform auth credential
    pub bot_token: String,
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Allow-list of moderated chat ids, registered at init
    #[serde(default)]
    pub moderated_chats: Vec<i64>,
    /// Preset staff roles, `user_id -> role level`, applied idempotently at init.
    /// Keys are strings because the document is JSON.
    #[serde(default)]
    pub preset_staff: HashMap<String, i64>,
    /// Destination chat for audit records
    pub staff_chat_id: Option<i64>,
    /// Audit partitioning (thread ids inside the staff chat)
    pub log_topic_id: Option<i64>,
    pub gban_topic_id: Option<i64>,
    pub punish_topic_id: Option<i64>,
    pub report_topic_id: Option<i64>,
    /// Autoban threshold
    #[serde(default = "default_max_warns")]
    pub max_warns: i64,
    /// Anti-spam window: more than this many messages per interval is spam
    #[serde(default = "default_spam_messages_count")]
    pub spam_messages_count: i64,
    #[serde(default = "default_spam_interval_seconds")]
    pub spam_interval_seconds: i64,
    /// Spam strikes before an automatic warn
    #[serde(default = "default_antispam_warn_threshold")]
    pub antispam_warn_threshold: i64,
    /// UI pagination
    #[serde(default = "default_users_per_page")]
    pub users_per_page: i64,
    /// AI classifier (disabled when the key is absent)
    pub perplexity_api_key: Option<String>,
    #[serde(default = "default_perplexity_model")]
    pub perplexity_model: String,
    /// Shown in UI help
    pub support_link: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn default_max_warns() -> i64 {
    3
}

fn default_spam_messages_count() -> i64 {
    5
}

fn default_spam_interval_seconds() -> i64 {
    10
}

fn default_antispam_warn_threshold() -> i64 {
    3
}

fn default_users_per_page() -> i64 {
    10
}

fn default_perplexity_model() -> String {
    "sonar".to_string()
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. JSON file named by `CHATWARDEN_CONFIG` (default `config.json`)
    /// 3. Environment variables (CHATWARDEN__*)
    ///
    /// # Errors
    /// Returns error if configuration is missing or invalid
    pub fn load() -> Result<Self, AppError> {
        let path =
            std::env::var("CHATWARDEN_CONFIG").unwrap_or_else(|_| "config.json".to_string());
        Self::load_from(&path)
    }

    /// Load configuration from an explicit file path
    pub fn load_from(path: &str) -> Result<Self, AppError> {
        use config::{Config, Environment, File, FileFormat};

        let config = Config::builder()
            .set_default("database_path", "chatwarden.db")?
            .set_default("max_warns", 3)?
            .set_default("spam_messages_count", 5)?
            .set_default("spam_interval_seconds", 10)?
            .set_default("antispam_warn_threshold", 3)?
            .set_default("users_per_page", 10)?
            .set_default("perplexity_model", "sonar")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::new(path, FileFormat::Json).required(false))
            .add_source(
                Environment::with_prefix("CHATWARDEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Parse the preset staff map into `(user_id, role)` pairs.
    pub fn preset_staff_parsed(&self) -> Result<Vec<(i64, i64)>, AppError> {
        let mut pairs = Vec::with_capacity(self.preset_staff.len());
        for (key, level) in &self.preset_staff {
            let user_id = key.parse::<i64>().map_err(|_| {
                AppError::Config(format!("preset_staff key is not a user id: {key:?}"))
            })?;
            pairs.push((user_id, *level));
        }
        pairs.sort_unstable();
        Ok(pairs)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.bot_token.trim().is_empty() {
            return Err(AppError::Config("bot_token must not be empty".to_string()));
        }

        if self.max_warns < 1 {
            return Err(AppError::Config("max_warns must be at least 1".to_string()));
        }

        if self.spam_interval_seconds < 1 || self.spam_messages_count < 1 {
            return Err(AppError::Config(
                "spam_interval_seconds and spam_messages_count must be positive".to_string(),
            ));
        }

        if self.users_per_page < 1 {
            return Err(AppError::Config(
                "users_per_page must be at least 1".to_string(),
            ));
        }

        for (_, level) in self.preset_staff.iter() {
            if !(0..=9).contains(level) {
                return Err(AppError::Config(format!(
                    "preset_staff role level out of range: {level}"
                )));
            }
        }
        // Keys are validated when parsed.
        self.preset_staff_parsed()?;

        if self.moderated_chats.is_empty() {
            tracing::warn!("moderated_chats is empty; no chat will be moderated");
        }

        if self.staff_chat_id.is_none() {
            tracing::warn!("staff_chat_id is not set; audit records will be dropped");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            bot_token: "123456:test-token".to_string(),
            database_path: PathBuf::from("/tmp/chatwarden-test.db"),
            moderated_chats: vec![-1001, -1002],
            preset_staff: HashMap::from([("42".to_string(), 9)]),
            staff_chat_id: Some(-1009),
            log_topic_id: Some(1),
            gban_topic_id: Some(2),
            punish_topic_id: Some(3),
            report_topic_id: Some(4),
            max_warns: 3,
            spam_messages_count: 5,
            spam_interval_seconds: 10,
            antispam_warn_threshold: 3,
            users_per_page: 10,
            perplexity_api_key: None,
            perplexity_model: "sonar".to_string(),
            support_link: None,
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn validate_accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_bot_token() {
        let mut config = valid_config();
        config.bot_token = "   ".to_string();

        let error = config.validate().expect_err("empty bot_token must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("bot_token")
        ));
    }

    #[test]
    fn validate_rejects_non_numeric_preset_staff_key() {
        let mut config = valid_config();
        config.preset_staff = HashMap::from([("@owner".to_string(), 9)]);

        let error = config
            .validate()
            .expect_err("non-numeric preset_staff key must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("preset_staff")
        ));
    }

    #[test]
    fn validate_rejects_zero_users_per_page() {
        let mut config = valid_config();
        config.users_per_page = 0;

        let error = config
            .validate()
            .expect_err("zero users_per_page must fail");
        assert!(matches!(
            error,
            AppError::Config(message) if message.contains("users_per_page")
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_role() {
        let mut config = valid_config();
        config.preset_staff = HashMap::from([("42".to_string(), 15)]);

        assert!(config.validate().is_err());
    }

    #[test]
    fn preset_staff_parsed_returns_sorted_pairs() {
        let mut config = valid_config();
        config.preset_staff = HashMap::from([
            ("300".to_string(), 5),
            ("100".to_string(), 9),
            ("200".to_string(), 8),
        ]);

        let pairs = config.preset_staff_parsed().unwrap();
        assert_eq!(pairs, vec![(100, 9), (200, 8), (300, 5)]);
    }
}
