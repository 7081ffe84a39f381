//! MCP endpoint resolution from add-on config vars.
//!
//! An inference add-on exposes its MCP server through config vars on the
//! attached app. The full MCP URL wins when present; otherwise the endpoint
//! is derived from the base inference URL.
//!
//! | Variable            | Meaning                                   |
//! |---------------------|-------------------------------------------|
//! | `INFERENCE_MCP_URL` | Full MCP endpoint URL                     |
//! | `INFERENCE_URL`     | Base URL; the endpoint is `<base>/mcp`    |
//! | `INFERENCE_KEY`     | Bearer token (optional)                   |

use std::fmt;

/// Full MCP endpoint URL.
pub const MCP_URL_VAR: &str = "INFERENCE_MCP_URL";
/// Base inference URL.
pub const BASE_URL_VAR: &str = "INFERENCE_URL";
/// Bearer token.
pub const TOKEN_VAR: &str = "INFERENCE_KEY";

/// Path appended to the base URL when no explicit MCP URL is configured.
const MCP_PATH: &str = "/mcp";

/// A resolved remote endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct McpEndpoint {
    /// Streamable HTTP endpoint URL.
    pub url: String,
    /// Bearer token, if the add-on issued one.
    pub token: Option<String>,
}

impl fmt::Debug for McpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpEndpoint")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl McpEndpoint {
    /// Resolve from an arbitrary config var source.
    ///
    /// Empty values are treated as unset. Returns `None` when neither URL
    /// variable is usable.
    pub fn from_vars<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let url = match get(MCP_URL_VAR) {
            Some(url) => url,
            None => {
                let base = get(BASE_URL_VAR)?;
                format!("{}{MCP_PATH}", base.trim_end_matches('/'))
            }
        };

        Some(Self {
            url,
            token: get(TOKEN_VAR),
        })
    }

    /// Resolve from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }
}
