//! Error types shared by the bridge's protocol and transport layers.
//!
//! `UpstreamError` covers everything that can go wrong talking to the remote
//! MCP server. None of its variants are fatal to the bridge: the caller logs
//! the error, drops the message that caused it, and keeps reading.
//!
//! `HandshakeError` is the one protocol violation with no legal way forward.

use thiserror::Error;

/// Failures of a single remote exchange or of the client configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The request (or reading its body) exceeded the configured timeout.
    #[error("Upstream request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// The remote endpoint.
        url: String,
        /// The configured request timeout.
        timeout_secs: u64,
    },

    /// TCP/TLS connection could not be established (DNS, refused, reset).
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed {
        /// The remote endpoint.
        url: String,
        /// Underlying error text.
        reason: String,
    },

    /// Any other transport-level failure while sending or reading.
    #[error("Upstream request failed: {reason}")]
    Request {
        /// Underlying error text.
        reason: String,
    },

    /// A buffered (non-streaming) response body exceeded the size cap.
    #[error("Upstream response exceeds {limit} byte limit")]
    ResponseTooLarge {
        /// The configured maximum.
        limit: usize,
    },

    /// The client configuration is unusable.
    #[error("Invalid upstream configuration: {details}")]
    InvalidConfig {
        /// What is wrong and where.
        details: String,
    },
}

impl UpstreamError {
    /// Label for the `error_type` log field.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::Request { .. } => "request_failed",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    /// Whether this is the request-timeout case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Handshake protocol violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// A message other than `initialize` arrived while no session exists.
    #[error("First message must be an initialize request, got {found}")]
    ExpectedInitialize {
        /// The offending method, or a description of the message shape.
        found: String,
    },
}
