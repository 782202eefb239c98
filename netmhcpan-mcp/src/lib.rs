//! MCP server for the NetMHCpan prediction wrapper.
//!
//! Exposes foreground predictions, the asynchronous job API, and report
//! analysis as MCP tools over a stdio transport, for LLM clients such as
//! Claude Desktop.

pub mod tools;

use anyhow::Result;
use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};

/// Loads configuration, opens the job store, and serves the MCP server on
/// stdio until the client disconnects.
///
/// # Errors
///
/// Returns an error when the job store cannot be opened or the transport
/// fails.
pub async fn serve_stdio() -> Result<()> {
    let config = netmhcpan::config::Config::load();
    let server = tools::NetMhcPanServer::new(config)?;

    let service = server.serve((stdin(), stdout())).await?;
    service.waiting().await?;

    Ok(())
}
