//! Command-line interface entry point for the NetMHCpan wrapper.

use anyhow::Result;
use netmhcpan::entry_point;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Diagnostics go to stderr, opt-in via RUST_LOG; stdout stays clean for
    // reports, JSON, and the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    // The MCP server owns stdio once started, so it is dispatched here
    // before the regular argument parsing path.
    if args.first().map(String::as_str) == Some("mcp-server") {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(netmhcpan_mcp::serve_stdio())?;
        return Ok(());
    }

    // Delegate CLI args to shared entry_point function
    let code = entry_point::run_with_args(args)?;
    std::process::exit(code);
}
