//! Error types for the stdio side of the bridge.
//!
//! `FramingError` covers everything wrong with a single stdin line. Every
//! variant except `Io` is recoverable: the line is logged and dropped.
//!
//! `ProxyError` ends the run.

use mcplink_core::error::{HandshakeError, UpstreamError};
use mcplink_core::jsonrpc::JsonRpcClassifyError;

/// Errors that can occur when reading or validating one NDJSON line.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// A single NDJSON line exceeds the configured maximum size.
    ///
    /// Checked before JSON parsing to prevent allocation of oversized values.
    #[error("Message exceeds maximum size of {max_bytes} bytes ({dropped} bytes dropped)")]
    MessageTooLarge {
        /// The configured maximum message size in bytes.
        max_bytes: usize,
        /// Bytes of the line that were discarded.
        dropped: usize,
    },

    /// The line is not valid UTF-8.
    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    /// The line is not valid JSON.
    #[error("Malformed JSON: {reason}")]
    MalformedJson {
        /// Human-readable description of the parse failure.
        reason: String,
    },

    /// The value, or an element of a batch, is not a JSON object.
    #[error("Not a JSON-RPC object{}", at_index(.index))]
    NotAnObject {
        /// Position within a batch, if the failure is inside an array.
        index: Option<usize>,
    },

    /// The `jsonrpc` field is absent.
    #[error("Missing required jsonrpc field{}", at_index(.index))]
    MissingVersion {
        /// Position within a batch, if the failure is inside an array.
        index: Option<usize>,
    },

    /// The `jsonrpc` field is present but not `"2.0"`.
    #[error("Unsupported JSON-RPC version: {version}{}", at_index(.index))]
    UnsupportedVersion {
        /// The version value found in the message, rendered as JSON.
        version: String,
        /// Position within a batch, if the failure is inside an array.
        index: Option<usize>,
    },

    /// An underlying IO error occurred while reading stdin.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn at_index(index: &Option<usize>) -> String {
    index.map(|i| format!(" (batch index {i})")).unwrap_or_default()
}

impl From<JsonRpcClassifyError> for FramingError {
    fn from(e: JsonRpcClassifyError) -> Self {
        match e {
            JsonRpcClassifyError::NotAnObject { index } => Self::NotAnObject { index },
            JsonRpcClassifyError::MissingVersion { index } => Self::MissingVersion { index },
            JsonRpcClassifyError::UnsupportedVersion { version, index } => {
                Self::UnsupportedVersion { version, index }
            }
        }
    }
}

impl FramingError {
    /// Label for the `error_type` log field.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MessageTooLarge { .. } => "message_too_large",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::MalformedJson { .. } => "malformed_json",
            Self::NotAnObject { .. } => "not_an_object",
            Self::MissingVersion { .. } => "missing_version",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::Io(_) => "io_error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures that terminate the bridge.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The local peer broke the handshake with no legal way forward.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The remote endpoint could not be configured.
    #[error(transparent)]
    Config(#[from] UpstreamError),

    /// stdin could not be read or stdout could not be written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
