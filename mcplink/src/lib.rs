//! mcplink: bridge a stdio MCP client to a remote Streamable HTTP MCP server.

pub mod cli;
pub mod error;
pub mod shim;
