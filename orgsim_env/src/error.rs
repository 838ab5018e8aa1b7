//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Request could not be sent or the connection dropped mid-flight
    #[error("Network error: {0}")]
    NetworkError(String),
    
    /// Endpoint refused the connection or is not configured
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),
    
    /// Request/response body (de)serialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
    
    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }
    
    /// Creates an unreachable error.
    pub fn unreachable(endpoint: impl std::fmt::Display) -> Self {
        Self::Unreachable(endpoint.to_string())
    }
    
    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::SerializationError(msg.to_string())
    }
}
