//! Gateway error types

use thiserror::Error;

/// Transport-level failure talking to the Snowflake REST API
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Timeout, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Decode, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Client, message)
    }
}

/// Error classification, used for logging only: nothing is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Connection refused, reset, DNS
    Network,
    /// The fixed request timeout elapsed
    Timeout,
    /// Response body was not JSON
    Decode,
    /// HTTP client could not be built or the request could not be formed
    Client,
}

impl GatewayErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Decode => "decode",
            Self::Client => "client",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::timeout(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            GatewayError::network(format!("Connection failed: {e}"))
        } else if e.is_builder() {
            GatewayError::client(format!("Invalid request: {e}"))
        } else {
            GatewayError::network(format!("Request failed: {e}"))
        }
    }
}
