//! mcp-relay: bridge a stdio MCP client to a remote MCP server.
//!
//! # Usage
//!
//! ```text
//! mcp-relay --url https://mcp.example.com/mcp --transport http
//! mcp-relay --url http://127.0.0.1:8888/sse --transport sse \
//!     --headers '{"Authorization":"Bearer token"}' --log /tmp/mcp-relay.log
//! ```
//!
//! stdout carries MCP messages only.  Diagnostics go to the `--log` file, or
//! to stderr when no log file is given.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use clap::Parser;
use reqwest::header::HeaderMap;
use tracing_subscriber::EnvFilter;

mod config;
mod endpoint;
mod message;
mod output;
mod relay;
mod transport;

use config::{RelayConfig, TransportMode};
use output::OutputWriter;
use relay::Relay;

const PRODUCT: &str = concat!("mcp-relay v", env!("CARGO_PKG_VERSION"));

/// Relay between a stdio MCP client and a remote MCP server over HTTP or SSE.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Upstream URL: the POST endpoint (http) or the SSE stream (sse).
    #[arg(long, default_value = "http://127.0.0.1:8888/sse")]
    url: String,

    /// Upstream transport mode.
    #[arg(long, value_enum, default_value_t = TransportMode::Http)]
    transport: TransportMode,

    /// Custom HTTP headers as a JSON object, e.g. '{"Authorization":"Bearer token"}'.
    #[arg(long)]
    headers: Option<String>,

    /// Enable debug logging, including message traffic.
    #[arg(long)]
    debug: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log.as_deref(), cli.debug)?;
    tracing::info!("{PRODUCT} started");

    let headers = match cli.headers.as_deref() {
        Some(json) => config::parse_headers(json)?,
        None => HeaderMap::new(),
    };
    let cfg = RelayConfig::new(cli.url, cli.transport, headers, cli.debug);

    let output = Arc::new(OutputWriter::new(tokio::io::stdout()));
    let relay = Relay::new(cfg, output).await.map_err(|err| {
        tracing::error!("failed to create relay: {err:#}");
        err
    })?;

    // Blocks until the client closes stdin.
    relay.run(tokio::io::BufReader::new(tokio::io::stdin())).await;

    tracing::info!("{PRODUCT} exiting");
    Ok(())
}

/// Install the global `tracing` subscriber.
///
/// Never writes to stdout.  `RUST_LOG` overrides the default filter of
/// `warn` for dependencies and `info` (or `debug`) for this crate.
fn init_logging(log: Option<&Path>, debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,mcp_relay={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_file(debug)
        .with_line_number(debug);

    match log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
