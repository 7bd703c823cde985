//! Transport error types

use crate::types::HttpMethodError;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid header value for {0}")]
    InvalidHeaderValue(String),

    /// Failure injected by the scripted transport
    #[error("Scripted failure: {0}")]
    Scripted(String),
}

impl TransportError {
    /// Whether the failure happened before any byte reached the target
    pub fn is_connect(&self) -> bool {
        match self {
            TransportError::NetworkError(e) => e.is_connect(),
            TransportError::Scripted(message) => message.contains("connect"),
            _ => false,
        }
    }

    /// Whether the request timed out in the client
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::NetworkError(e) if e.is_timeout())
    }
}
