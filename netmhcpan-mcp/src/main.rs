//! NetMHCpan MCP Server
//!
//! This binary exposes MHC class I binding predictions and the asynchronous
//! job API as MCP tools, allowing LLMs like Claude to drive netMHCpan runs.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Main entry point for the MCP server.
///
/// Starts the server using stdio transport, which is the standard way
/// for MCP clients like Claude Desktop to communicate with servers.
#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP transport; diagnostics stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    netmhcpan_mcp::serve_stdio().await
}
