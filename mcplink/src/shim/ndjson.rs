//! NDJSON line validation for the stdio side of the bridge.
//!
//! Pure parsing, no I/O. The proxy's read loop calls [`parse_stdio_message`]
//! for each non-empty line and drops the line on any error.

use mcplink_core::jsonrpc::{Envelope, validate_envelope};

use crate::error::FramingError;

/// Maximum NDJSON message size (10 MB).
///
/// Lines exceeding this limit are rejected before JSON parsing to prevent
/// allocation of oversized `serde_json::Value` trees from crafted input.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// A validated stdin line.
#[derive(Debug, Clone)]
pub struct StdioMessage {
    /// Classified single message or batch.
    pub envelope: Envelope,
    /// The trimmed line, forwarded to the remote byte for byte.
    pub raw: String,
}

impl StdioMessage {
    /// Method name used by the handshake, `None` for responses and batches.
    pub fn method(&self) -> Option<&str> {
        self.envelope.method()
    }
}

/// Parse and validate a single NDJSON line.
///
/// # Errors
///
/// Returns [`FramingError`] for:
/// - Oversized messages (`MessageTooLarge`), checked before JSON parsing
/// - Empty or invalid JSON (`MalformedJson`)
/// - A value, or batch element, that is not an object (`NotAnObject`)
/// - Missing `jsonrpc` field (`MissingVersion`)
/// - Wrong `jsonrpc` version (`UnsupportedVersion`)
pub fn parse_stdio_message(line: &str) -> Result<StdioMessage, FramingError> {
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(FramingError::MessageTooLarge {
            max_bytes: MAX_MESSAGE_BYTES,
            dropped: line.len(),
        });
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(FramingError::MalformedJson {
            reason: "empty message".to_string(),
        });
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| FramingError::MalformedJson {
            reason: e.to_string(),
        })?;

    let envelope = validate_envelope(&value)?;

    Ok(StdioMessage {
        envelope,
        raw: trimmed.to_string(),
    })
}
