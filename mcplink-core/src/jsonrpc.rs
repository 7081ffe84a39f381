//! Transport-agnostic JSON-RPC 2.0 envelope validation and classification.
//!
//! This module operates on an already-parsed `serde_json::Value`. The stdio
//! shim parses each NDJSON line once and hands the value here to confirm the
//! envelope shape (object, or array of objects, each carrying
//! `"jsonrpc": "2.0"`) and to derive the routing information the handshake
//! needs: the method name of a single message, or the size of a batch.

use std::fmt;

/// The only JSON-RPC version accepted on either side of the bridge.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request/response identifier.
///
/// Accepts integers, strings, and `null`. Anything else in the `id` slot is
/// treated as if the field were absent; the bridge never rewrites ids, so the
/// original text is still forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonRpcId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
    /// Explicit `null` id.
    Null,
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Classification of a single JSON-RPC object.
///
/// Determined by presence/absence of `id` and `method` fields:
/// - Request: has both `id` and `method`
/// - Notification: has `method` but no `id`
/// - Response: anything else (results, errors, and objects carrying neither
///   field, which are still valid envelopes and are forwarded as-is)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcMessageKind {
    /// Has both `id` and `method`: a request expecting a response.
    Request { id: JsonRpcId, method: String },
    /// Has `method` but no `id`: a fire-and-forget notification.
    Notification { method: String },
    /// No `method`: a response, or an object the bridge does not interpret.
    Response { id: Option<JsonRpcId> },
}

impl JsonRpcMessageKind {
    /// The method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method } => Some(method),
            Self::Response { .. } => None,
        }
    }
}

/// The validated shape of one inbound line.
///
/// A batch is kept as a single atomic unit: it is queued, forwarded, and
/// ordered as one message, and never matches a handshake method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// A single JSON-RPC object.
    Single(JsonRpcMessageKind),
    /// A JSON array of JSON-RPC objects.
    Batch(Vec<JsonRpcMessageKind>),
}

impl Envelope {
    /// Method of a single request or notification. Batches have none.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Single(kind) => kind.method(),
            Self::Batch(_) => None,
        }
    }

    /// Short label for log fields.
    pub fn label(&self) -> String {
        match self {
            Self::Single(JsonRpcMessageKind::Request { method, .. })
            | Self::Single(JsonRpcMessageKind::Notification { method }) => method.clone(),
            Self::Single(JsonRpcMessageKind::Response { id: Some(id) }) => format!("response {id}"),
            Self::Single(JsonRpcMessageKind::Response { id: None }) => "response".to_string(),
            Self::Batch(items) => format!("batch[{}]", items.len()),
        }
    }
}

/// Errors that can occur during envelope validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonRpcClassifyError {
    /// The value (or a batch element) is not a JSON object.
    #[error("expected a JSON object{}", at_index(.index))]
    NotAnObject {
        /// Position within a batch, if the failure is inside an array.
        index: Option<usize>,
    },
    /// The `jsonrpc` field is absent.
    #[error("missing jsonrpc field{}", at_index(.index))]
    MissingVersion {
        /// Position within a batch, if the failure is inside an array.
        index: Option<usize>,
    },
    /// The `jsonrpc` field is present but not `"2.0"`.
    #[error("unsupported jsonrpc version {version}{}", at_index(.index))]
    UnsupportedVersion {
        /// The offending value, rendered as JSON.
        version: String,
        /// Position within a batch, if the failure is inside an array.
        index: Option<usize>,
    },
}

fn at_index(index: &Option<usize>) -> String {
    index.map(|i| format!(" at batch index {i}")).unwrap_or_default()
}

/// Validate a parsed value as a JSON-RPC 2.0 envelope and classify it.
///
/// The top-level value must be an object, or an array whose every element is
/// an object; each object must carry `"jsonrpc": "2.0"`. An empty array is
/// accepted (every element of it vacuously satisfies the rule).
///
/// # Errors
///
/// Returns the first [`JsonRpcClassifyError`] encountered, with the batch
/// index when the failure is inside an array.
pub fn validate_envelope(value: &serde_json::Value) -> Result<Envelope, JsonRpcClassifyError> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| classify_object(item, Some(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Envelope::Batch),
        other => classify_object(other, None).map(Envelope::Single),
    }
}

fn classify_object(
    value: &serde_json::Value,
    index: Option<usize>,
) -> Result<JsonRpcMessageKind, JsonRpcClassifyError> {
    let obj = value
        .as_object()
        .ok_or(JsonRpcClassifyError::NotAnObject { index })?;

    match obj.get("jsonrpc") {
        None => return Err(JsonRpcClassifyError::MissingVersion { index }),
        Some(v) if v.as_str() == Some(JSONRPC_VERSION) => {}
        Some(v) => {
            return Err(JsonRpcClassifyError::UnsupportedVersion {
                version: v.to_string(),
                index,
            });
        }
    }

    let id = obj.get("id").and_then(parse_id);
    let method = obj
        .get("method")
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(match (id, method) {
        (Some(id), Some(method)) => JsonRpcMessageKind::Request { id, method },
        (None, Some(method)) => JsonRpcMessageKind::Notification { method },
        (id, None) => JsonRpcMessageKind::Response { id },
    })
}

/// Parse a JSON value into a `JsonRpcId`.
///
/// Accepts string, integer, or null. Floats, booleans, arrays, and objects
/// yield `None`.
fn parse_id(value: &serde_json::Value) -> Option<JsonRpcId> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().map(JsonRpcId::Number),
        serde_json::Value::String(s) => Some(JsonRpcId::String(s.clone())),
        serde_json::Value::Null => Some(JsonRpcId::Null),
        _ => None,
    }
}
