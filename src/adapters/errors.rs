//! Exchange adapter error types
//!
//! All exchange-related errors are wrapped in ExchangeError enum
//! which implements thiserror for consistent error handling.

use thiserror::Error;

/// Exchange-specific error types for adapter operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Connection to exchange failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Network operation timed out
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// HTTP 429 from the venue; `retry_after` carries the server hint
    #[error("Rate limited by venue (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Server-side failure (HTTP 5xx)
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Invalid or unexpected response from exchange
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl ExchangeError {
    /// Whether a retry of the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::ConnectionFailed(_)
                | ExchangeError::NetworkTimeout(_)
                | ExchangeError::RateLimited { .. }
                | ExchangeError::ServerError(_)
                | ExchangeError::InvalidResponse(_)
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::NetworkTimeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::InvalidResponse(err.to_string())
        } else {
            ExchangeError::ConnectionFailed(err.to_string())
        }
    }
}

/// Result type alias for exchange operations
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_display() {
        let err = ExchangeError::ConnectionFailed("timeout".to_string());
        assert_eq!(err.to_string(), "Connection failed: timeout");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::ServerError(502).is_transient());
        assert!(ExchangeError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(ExchangeError::NetworkTimeout("read".into()).is_transient());
        assert!(!ExchangeError::WebSocket(Box::new(
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
        ))
        .is_transient());
    }
}
