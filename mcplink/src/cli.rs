//! CLI argument types for `mcplink start` and `mcplink url`.
//!
//! These types are defined separately from `main.rs` so that integration tests
//! can parse them directly.

use std::time::Duration;

use clap::Args;

use mcplink_core::config::{McpEndpoint, TOKEN_VAR};
use mcplink_core::error::UpstreamError;
use mcplink_core::transport::UpstreamConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Start Subcommand Args
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `mcplink start`.
///
/// Runs the bridge in the foreground until stdin closes. Without `--url` the
/// endpoint is resolved from `INFERENCE_MCP_URL` or `INFERENCE_URL`.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Remote MCP endpoint URL (overrides the environment).
    #[arg(long)]
    pub url: Option<String>,

    /// Bearer token (overrides `INFERENCE_KEY`).
    #[arg(long)]
    pub token: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,
}

impl StartArgs {
    /// Build the upstream configuration, flags first, environment second.
    ///
    /// # Errors
    ///
    /// `UpstreamError::InvalidConfig` if no URL is available from either
    /// source or a timeout variable is malformed.
    pub fn upstream_config(&self) -> Result<UpstreamConfig, UpstreamError> {
        let url = self
            .url
            .clone()
            .or_else(|| McpEndpoint::from_env().map(|endpoint| endpoint.url));
        let token = self.token.clone().or_else(|| {
            std::env::var(TOKEN_VAR)
                .ok()
                .filter(|token| !token.trim().is_empty())
        });

        let mut config =
            UpstreamConfig::from_env_with_endpoint(url.map(|url| McpEndpoint { url, token }))?;
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Url Subcommand Args
// ─────────────────────────────────────────────────────────────────────────────

/// Arguments for `mcplink url`.
///
/// Prints the MCP endpoint the bridge would connect to.
#[derive(Args, Debug)]
pub struct UrlArgs {
    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,
}
