//! Wire-level types shared by inference transports.

use crate::error::EnvError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A target URL plus the headers every request to it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }
    
    /// Adds an `Authorization: Bearer <token>` header.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .push(("Authorization".to_string(), format!("Bearer {}", token)));
        self
    }
    
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A completed HTTP exchange, successful or not.
///
/// Non-2xx statuses are *not* errors at this layer; the caller decides
/// whether a 429 is retried or a 500 is surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    
    /// Parsed `retry-after` header (seconds form only)
    pub retry_after: Option<Duration>,
    
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }
    
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
    
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: 429,
            retry_after,
            body: String::new(),
        }
    }
    
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
    
    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, EnvError> {
        serde_json::from_str(&self.body).map_err(EnvError::serialization)
    }
}

/// Parses a `retry-after` header value given in whole seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
