//! Application-wide error types using thiserror
//!
//! All errors in the application should be wrapped in AppError
//! to provide consistent error handling across the codebase.

use thiserror::Error;

use crate::adapters::errors::ExchangeError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_converts_to_app_error() {
        let exchange_err = ExchangeError::ConnectionFailed("timeout".into());
        let app_err: AppError = exchange_err.into();
        let msg = app_err.to_string();
        assert!(msg.contains("Exchange error"), "Got: {}", msg);
        assert!(msg.contains("timeout"), "Got: {}", msg);
    }

    #[test]
    fn test_serde_error_converts_to_app_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let app_err: AppError = serde_err.into();
        assert!(app_err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_config_error_display() {
        let err = AppError::Config("no exchanges configured".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: no exchanges configured"
        );
    }
}
