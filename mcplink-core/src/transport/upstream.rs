//! Streamable HTTP client for the remote MCP server.
//!
//! Every message is one `POST` to the endpoint URL. The reply is handed back
//! undecoded: status, session header, content type, and a byte stream, so
//! the caller can choose between SSE decoding and buffering the whole body.
//!
//! # Error Classification
//!
//! - No reply headers within `timeout` → `UpstreamError::Timeout`
//! - Connection errors → `UpstreamError::ConnectionFailed`
//! - Anything else → `UpstreamError::Request`
//!
//! HTTP error statuses are not errors here. A 404 means "session unknown"
//! and a 5xx body is still a reply; interpreting them is the caller's job.
//!
//! The request timeout stops once the reply headers arrive. An event stream
//! may then run as long as the server keeps it open, so a long `tools/call`
//! streaming progress events still delivers its final result.
//!
//! No automatic retry: a dropped message is not resent.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::config::McpEndpoint;
use crate::error::UpstreamError;

/// Header carrying the server-assigned session identifier.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// The bridge accepts either reply shape the transport allows.
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration for the upstream client.
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Streamable HTTP endpoint URL.
    pub url: String,
    /// Bearer token. No `Authorization` header is sent when absent.
    pub token: Option<String>,
    /// Wait for the reply headers. Reading the body is not bounded.
    pub timeout: Duration,
    /// Connection timeout (TCP + TLS handshake).
    pub connect_timeout: Duration,
    /// Maximum buffered (non-SSE) response body size in bytes.
    pub max_response_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_response_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_response_size", &self.max_response_size)
            .finish()
    }
}

impl UpstreamConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `INFERENCE_MCP_URL` / `INFERENCE_URL` (one required): see [`McpEndpoint`]
    /// - `INFERENCE_KEY` (optional): bearer token
    /// - `MCPLINK_REQUEST_TIMEOUT_SECS` (default: 60): request timeout
    /// - `MCPLINK_CONNECT_TIMEOUT_SECS` (default: 5): connection timeout
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidConfig` if no endpoint URL can be
    /// resolved or a timeout variable is set but not a valid integer.
    pub fn from_env() -> Result<Self, UpstreamError> {
        Self::from_env_with_endpoint(McpEndpoint::from_env())
    }

    /// Like [`from_env`](Self::from_env), but with an already resolved
    /// endpoint (for example one assembled from command-line flags). Only the
    /// timeout variables are read from the environment.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidConfig` if `endpoint` is `None` or a
    /// timeout variable is set but not a valid integer.
    pub fn from_env_with_endpoint(endpoint: Option<McpEndpoint>) -> Result<Self, UpstreamError> {
        let endpoint = endpoint.ok_or_else(|| UpstreamError::InvalidConfig {
            details: "No MCP server URL found: set INFERENCE_MCP_URL or INFERENCE_URL"
                .to_string(),
        })?;

        let timeout_secs = secs_from_env("MCPLINK_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let connect_timeout_secs =
            secs_from_env("MCPLINK_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            ..Self::with_endpoint(endpoint)
        })
    }

    /// Create a config for the given URL with default settings and no token.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a config from a resolved endpoint with default settings.
    pub fn with_endpoint(endpoint: McpEndpoint) -> Self {
        Self {
            url: endpoint.url,
            token: endpoint.token,
            ..Default::default()
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Result<u64, UpstreamError> {
    match std::env::var(name) {
        Ok(val) => val.trim().parse().map_err(|_| UpstreamError::InvalidConfig {
            details: format!("{name} must be a valid integer, got: '{val}'"),
        }),
        Err(_) => Ok(default),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Response body as a stream of byte chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// A reply from the remote, body not yet read.
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Mcp-Session-Id` header, if present and valid text.
    pub session_id: Option<String>,
    /// Value of the `Content-Type` header, empty if absent.
    pub content_type: String,
    /// Declared body length, if the server sent one.
    pub content_length: Option<u64>,
    /// The body.
    pub body: BodyStream,
}

impl fmt::Debug for RemoteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteResponse")
            .field("status", &self.status)
            .field("session_id", &self.session_id)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl RemoteResponse {
    /// Read the whole body as text, enforcing a size limit.
    ///
    /// Checks `Content-Length` first for early rejection, then accumulates
    /// chunk by chunk so bodies without a declared length are capped too.
    /// Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// `UpstreamError::ResponseTooLarge` past `limit`; any error raised while
    /// reading the stream.
    pub async fn text(self, limit: usize) -> Result<String, UpstreamError> {
        if let Some(content_length) = self.content_length {
            if content_length > limit as u64 {
                warn!(
                    content_length,
                    max_response_size = limit,
                    "Upstream response exceeds size limit (Content-Length)"
                );
                return Err(UpstreamError::ResponseTooLarge { limit });
            }
        }

        let mut buf = Vec::with_capacity(
            self.content_length
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(limit),
        );

        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > limit {
                warn!(
                    accumulated = buf.len(),
                    chunk_size = chunk.len(),
                    max_response_size = limit,
                    "Upstream response exceeds size limit during streaming"
                );
                return Err(UpstreamError::ResponseTooLarge { limit });
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Sends one JSON-RPC message to the remote (enables mocking in tests).
#[async_trait::async_trait]
pub trait McpTransport: Send + Sync {
    /// POST `message` verbatim, attaching `session_id` when present.
    async fn post(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<RemoteResponse, UpstreamError>;
}

/// Upstream MCP client.
///
/// Cloning is cheap; reqwest pools connections internally.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a new upstream client.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidConfig` if the URL is empty or not a
    /// valid absolute URL, or the HTTP client cannot be built.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        if config.url.is_empty() {
            return Err(UpstreamError::InvalidConfig {
                details: "endpoint URL is empty".to_string(),
            });
        }

        if let Err(e) = reqwest::Url::parse(&config.url) {
            return Err(UpstreamError::InvalidConfig {
                details: format!("invalid endpoint URL '{}': {}", config.url, e),
            });
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| UpstreamError::InvalidConfig {
                details: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl McpTransport for UpstreamClient {
    #[tracing::instrument(skip_all, fields(has_session = session_id.is_some()))]
    async fn post(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<RemoteResponse, UpstreamError> {
        let url = &self.config.url;
        debug!(url = %url, bytes = message.len(), "Posting message to upstream");

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_BOTH)
            .body(message.to_owned());
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let timeout = self.config.timeout;
        let response = match tokio::time::timeout(timeout, request.send()).await {
            Ok(sent) => sent.map_err(|e| classify_error(e, url, timeout))?,
            Err(_) => {
                return Err(UpstreamError::Timeout {
                    url: url.clone(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let status = response.status().as_u16();
        let session_id = header(SESSION_HEADER);
        let content_type = header(CONTENT_TYPE.as_str()).unwrap_or_default();
        let content_length = response.content_length();

        debug!(status, content_type = %content_type, "Received upstream response");

        let url = url.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify_error(e, &url, timeout)))
            .boxed();

        Ok(RemoteResponse {
            status,
            session_id,
            content_type,
            content_length,
            body,
        })
    }
}

/// Classify a reqwest error into an `UpstreamError`.
fn classify_error(error: reqwest::Error, url: &str, timeout: Duration) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else if error.is_connect() {
        UpstreamError::ConnectionFailed {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        UpstreamError::Request {
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_string, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;

    /// RAII guard for env var tests that saves and restores env var state.
    struct EnvVarGuard {
        vars: Vec<(&'static str, Option<String>)>,
    }

    impl EnvVarGuard {
        fn new(var_names: &[&'static str]) -> Self {
            let vars = var_names
                .iter()
                .map(|&name| (name, std::env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            for (name, original) in &self.vars {
                // SAFETY: We're in a single-threaded test context (enforced by #[serial])
                unsafe {
                    match original {
                        Some(val) => std::env::set_var(name, val),
                        None => std::env::remove_var(name),
                    }
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "INFERENCE_MCP_URL",
        "INFERENCE_URL",
        "INFERENCE_KEY",
        "MCPLINK_REQUEST_TIMEOUT_SECS",
        "MCPLINK_CONNECT_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            // SAFETY: Test runs serially via #[serial], env var mutation is isolated
            unsafe { std::env::remove_var(name) };
        }
    }

    fn client_for(server: &MockServer, token: Option<&str>) -> UpstreamClient {
        let config = UpstreamConfig {
            url: format!("{}/mcp", server.uri()),
            token: token.map(str::to_owned),
            ..UpstreamConfig::default()
        };
        UpstreamClient::new(config).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = UpstreamConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_response_size, 10 * 1024 * 1024);
        assert!(config.url.is_empty());
        assert!(config.token.is_none());
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = UpstreamConfig {
            token: Some("inf-secret".into()),
            ..UpstreamConfig::with_url("http://localhost:3000/mcp")
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("inf-secret"));
        assert!(debug.contains("localhost:3000"));
    }

    #[test]
    fn test_upstream_client_empty_url() {
        let result = UpstreamClient::new(UpstreamConfig::default());
        assert!(matches!(result, Err(UpstreamError::InvalidConfig { .. })));
    }

    #[test]
    fn test_upstream_client_invalid_url() {
        let result = UpstreamClient::new(UpstreamConfig::with_url("not a url"));
        match result {
            Err(UpstreamError::InvalidConfig { details }) => {
                assert!(details.contains("not a url"), "got: {details}");
            }
            other => panic!("Expected InvalidConfig, got: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_missing_url() {
        let _guard = EnvVarGuard::new(ENV_VARS);
        clear_env();

        let result = UpstreamConfig::from_env();
        match result {
            Err(UpstreamError::InvalidConfig { details }) => {
                assert!(details.contains("No MCP server URL found"));
            }
            other => panic!("Expected InvalidConfig, got: {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_url() {
        let _guard = EnvVarGuard::new(ENV_VARS);
        clear_env();
        // SAFETY: Test runs serially via #[serial], env var mutation is isolated
        unsafe {
            std::env::set_var("INFERENCE_URL", "https://inference.example.com");
            std::env::set_var("INFERENCE_KEY", "inf-key");
            std::env::set_var("MCPLINK_REQUEST_TIMEOUT_SECS", "15");
        }

        let config = UpstreamConfig::from_env().unwrap();
        assert_eq!(config.url, "https://inference.example.com/mcp");
        assert_eq!(config.token.as_deref(), Some("inf-key"));
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_config_from_env_invalid_timeout() {
        let _guard = EnvVarGuard::new(ENV_VARS);
        clear_env();
        // SAFETY: Test runs serially via #[serial], env var mutation is isolated
        unsafe {
            std::env::set_var("INFERENCE_MCP_URL", "https://mcp.example.com/mcp");
            std::env::set_var("MCPLINK_CONNECT_TIMEOUT_SECS", "soon");
        }

        match UpstreamConfig::from_env() {
            Err(UpstreamError::InvalidConfig { details }) => {
                assert!(details.contains("MCPLINK_CONNECT_TIMEOUT_SECS"));
                assert!(details.contains("soon"));
            }
            other => panic!("Expected InvalidConfig, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_sends_protocol_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(header("accept", "application/json, text/event-stream"))
            .and(header("authorization", "Bearer inf-key"))
            .and(body_string(INIT))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Mcp-Session-Id", "abc123")
                    .set_body_raw(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("inf-key"));
        let response = client.post(INIT, None).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.session_id.as_deref(), Some("abc123"));
        assert_eq!(response.content_type, "application/json");
        let text = response.text(1024).await.unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }

    #[tokio::test]
    async fn test_post_attaches_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("mcp-session-id", "abc123"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let response = client.post("{}", Some("abc123")).await.unwrap();
        assert_eq!(response.status, 202);
    }

    #[tokio::test]
    async fn test_post_without_token_omits_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        client.post(INIT, None).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
        assert!(requests[0].headers.get("mcp-session-id").is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Session not found"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let response = client.post(INIT, Some("gone")).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_post_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = UpstreamConfig {
            timeout: Duration::from_millis(100),
            ..UpstreamConfig::with_url(server.uri())
        };
        let client = UpstreamClient::new(config).unwrap();

        let err = client.post(INIT, None).await.unwrap_err();
        assert!(err.is_timeout(), "got: {err:?}");
    }

    #[tokio::test]
    async fn test_post_connection_refused() {
        let client = UpstreamClient::new(UpstreamConfig::with_url("http://127.0.0.1:1/mcp")).unwrap();
        let err = client.post(INIT, None).await.unwrap_err();
        assert!(
            matches!(err, UpstreamError::ConnectionFailed { .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_event_stream_content_type_exposed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("data: {}\n\n", "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let response = client.post(INIT, None).await.unwrap();
        assert!(crate::transport::is_event_stream(&response.content_type));
    }

    #[tokio::test]
    async fn test_text_within_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let response = client.post(INIT, None).await.unwrap();
        assert_eq!(response.text(1024).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_text_content_length_exceeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 2048]))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let response = client.post(INIT, None).await.unwrap();
        let err = response.text(1024).await.unwrap_err();
        assert_eq!(err, UpstreamError::ResponseTooLarge { limit: 1024 });
    }

    #[tokio::test]
    async fn test_text_streamed_body_exceeds() {
        let chunks: Vec<Result<Bytes, UpstreamError>> =
            vec![Ok(Bytes::from(vec![b'a'; 600])), Ok(Bytes::from(vec![b'b'; 600]))];
        let response = RemoteResponse {
            status: 200,
            session_id: None,
            content_type: String::new(),
            content_length: None,
            body: futures_util::stream::iter(chunks).boxed(),
        };
        let err = response.text(1024).await.unwrap_err();
        assert_eq!(err, UpstreamError::ResponseTooLarge { limit: 1024 });
    }
}
