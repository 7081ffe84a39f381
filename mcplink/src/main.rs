//! mcplink CLI entry point.
//!
//! Dispatches to `start` (run the stdio bridge) or `url` (print the
//! resolved endpoint).

use clap::{Parser, Subcommand};

use mcplink::cli::{StartArgs, UrlArgs};
use mcplink::shim::proxy::run_stdio;
use mcplink_core::config::McpEndpoint;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// mcplink: talk to a remote MCP server from a stdio-only client.
#[derive(Parser)]
#[command(name = "mcplink", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge stdin/stdout to the remote MCP server until stdin closes.
    Start(StartArgs),
    /// Print the MCP server URL resolved from the environment.
    Url(UrlArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Start(args) => {
            init_tracing(args.verbose);
            run_start(args).await
        }
        Commands::Url(args) => {
            init_tracing(args.verbose);
            run_url()
        }
    };

    std::process::exit(code);
}

async fn run_start(args: StartArgs) -> i32 {
    let config = match args.upstream_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            eprintln!("mcplink start: {e}");
            return 1;
        }
    };

    match run_stdio(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "bridge stopped");
            eprintln!("mcplink start: {e}");
            1
        }
    }
}

fn run_url() -> i32 {
    match McpEndpoint::from_env() {
        Some(endpoint) => {
            println!("{}", endpoint.url);
            0
        }
        None => {
            eprintln!("No MCP server URL found");
            1
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracing Init
// ─────────────────────────────────────────────────────────────────────────────

/// Initialise tracing subscriber with stderr output.
///
/// stdout carries protocol traffic, so logs never go there. When `verbose`
/// is true the filter is `debug`; otherwise `RUST_LOG` is respected,
/// defaulting to `warn`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
