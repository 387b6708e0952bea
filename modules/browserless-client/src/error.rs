use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

/// Coarse failure classes used to pick a retry disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    NetworkTimeout,
    Other,
}

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Rate limited by browser pool: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out connecting to browser pool after {0:?}")]
    Timeout(Duration),

    #[error("Browser pool rejected credentials (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Invalid browser pool endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Unknown browser pool region: {0}")]
    UnknownRegion(String),

    #[error("Browser pool connect failed: {0}")]
    Other(String),
}

impl BrowserlessError {
    /// Classify a connect failure from its message. CDP clients surface the
    /// websocket upgrade failure as text, so the status code has to be sniffed.
    pub fn from_connect_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit") {
            return BrowserlessError::RateLimited(message.to_string());
        }
        if lower.contains("401") || lower.contains("unauthorized") {
            return BrowserlessError::Unauthorized {
                status: 401,
                message: message.to_string(),
            };
        }
        if lower.contains("403") || lower.contains("forbidden") {
            return BrowserlessError::Unauthorized {
                status: 403,
                message: message.to_string(),
            };
        }
        if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("broken pipe")
            || lower.contains("dns")
            || lower.contains("503")
            || lower.contains("502")
        {
            return BrowserlessError::Network(message.to_string());
        }

        BrowserlessError::Other(message.to_string())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            BrowserlessError::RateLimited(_) => FailureKind::RateLimited,
            BrowserlessError::Network(_) | BrowserlessError::Timeout(_) => {
                FailureKind::NetworkTimeout
            }
            _ => FailureKind::Other,
        }
    }

    /// Whether another connect attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BrowserlessError::Unauthorized { .. }
                | BrowserlessError::InvalidEndpoint(_)
                | BrowserlessError::UnknownRegion(_)
        )
    }
}
