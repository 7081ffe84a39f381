//! MCP method names the bridge inspects.
//!
//! Every other method is opaque: it is validated as a JSON-RPC envelope and
//! forwarded byte-for-byte.

/// The client's opening request. Must be the first message of a session.
pub const INITIALIZE: &str = "initialize";

/// The client's acknowledgement that completes the handshake.
pub const INITIALIZED: &str = "notifications/initialized";

/// Returns `true` for the two methods that drive the handshake.
pub fn is_handshake_method(method: &str) -> bool {
    matches!(method, INITIALIZE | INITIALIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_methods() {
        assert!(is_handshake_method("initialize"));
        assert!(is_handshake_method("notifications/initialized"));
    }

    #[test]
    fn test_other_methods_are_not_handshake() {
        assert!(!is_handshake_method("initialized"));
        assert!(!is_handshake_method("tools/list"));
        assert!(!is_handshake_method("notifications/cancelled"));
        assert!(!is_handshake_method(""));
    }
}
