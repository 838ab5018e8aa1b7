//! LM client error types with retry classification.
//!
//! Distinguishes transient errors (retry or defer to the next tick) from
//! permanent ones (misconfiguration, bad requests).

use orgsim_env::EnvError;
use std::time::Duration;
use thiserror::Error;

/// Error from an inference call.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    /// The kind of error
    pub kind: LlmErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Server-supplied retry delay
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
            retry_after: None,
        }
    }
    
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }
    
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, Some(status_code), message)
    }
    
    pub fn client_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ClientError, Some(status_code), message)
    }
    
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::NetworkError, None, message)
    }
    
    pub fn timeout(after: Duration) -> Self {
        Self::new(LlmErrorKind::Timeout, None, format!("no response after {}ms", after.as_millis()))
    }
    
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ParseError, None, message)
    }
    
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::NotConfigured, None, message)
    }
    
    /// Check if this error is transient.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<EnvError> for LlmError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::Timeout(ms) => LlmError::timeout(Duration::from_millis(ms)),
            EnvError::SerializationError(msg) => LlmError::parse_error(msg),
            other => LlmError::network_error(other.to_string()),
        }
    }
}

/// Classification of LM errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Rate limited (429)
    RateLimited,
    /// Server error (5xx)
    ServerError,
    /// Client error (4xx other than 429)
    ClientError,
    /// Connection failed or dropped
    NetworkError,
    /// Hard per-call timeout elapsed
    Timeout,
    /// Response body did not have the expected shape
    ParseError,
    /// Provider selected without credentials
    NotConfigured,
}

impl LlmErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited
                | LlmErrorKind::ServerError
                | LlmErrorKind::NetworkError
                | LlmErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmErrorKind::RateLimited => write!(f, "Rate limited"),
            LlmErrorKind::ServerError => write!(f, "Server error"),
            LlmErrorKind::ClientError => write!(f, "Client error"),
            LlmErrorKind::NetworkError => write!(f, "Network error"),
            LlmErrorKind::Timeout => write!(f, "Timeout"),
            LlmErrorKind::ParseError => write!(f, "Parse error"),
            LlmErrorKind::NotConfigured => write!(f, "Not configured"),
        }
    }
}

/// Retry behavior for 429 responses.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base when no retry-after is supplied
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryConfig {
    /// `retry_after` if the server sent one, else base * 2^attempt.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.base_delay.saturating_mul(2u32.saturating_pow(attempt)))
    }
}

/// Classify an HTTP status code into an LlmError.
pub fn classify_http_status(status: u16, body: &str, retry_after: Option<Duration>) -> LlmError {
    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>())
    };
    match status {
        429 => LlmError::rate_limited(message, retry_after),
        500..=599 => LlmError::server_error(status, message),
        _ => LlmError::client_error(status, message),
    }
}
