//! mcplink core: protocol and transport for bridging a stdio MCP client to a
//! remote Streamable HTTP server.
//!
//! Nothing here touches stdin or stdout. The handshake state machine is pure
//! and the transport sits behind [`transport::McpTransport`], so the CLI crate
//! can drive both and tests can replace the network.

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod protocol;
pub mod transport;
