//! Error types for ChatWarden
//!
//! All errors in the application are converted to `AppError`.
//! User-visible variants carry a reply text via [`AppError::user_message`];
//! the rest are logged or propagated.

use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error (surfaced; indicates I/O trouble, never swallowed)
    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// Issuer lacks the required role. Silent at the platform layer:
    /// no reply is sent, so staff membership does not leak.
    #[error("Not authorized")]
    AuthzDenied,

    /// Target user could not be resolved
    #[error("Target not found")]
    TargetNotFound,

    /// Malformed user input (duration, id, …)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Chat platform RPC failure (logged and ignored at fan-out boundaries)
    #[error("Platform error: {0}")]
    Platform(String),

    /// AI classifier failure (logged, mapped to a `none` verdict upstream)
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Classifier(err.to_string())
    }
}

impl AppError {
    /// Reply text for errors that the originating user should see.
    ///
    /// Returns `None` for silent or internal errors. The text is plain and
    /// safe to interpolate into an HTML reply without further escaping.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AppError::TargetNotFound => Some("Пользователь не найден".to_string()),
            AppError::Parse(msg) => Some(format!("Неверный формат: {msg}")),
            _ => None,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
