pub mod mcp;

use anyhow::Result;
use clap::Subcommand;

use crate::config::GlobalConfig;

#[derive(Subcommand)]
pub enum Commands {
    /// Serve inventory resources and tools over stdio or SSE
    ///
    ///  - stdio: JSON-RPC, one message per line (default).
    ///  - sse: GET /sse opens a session, POST /messages/?session_id=<id> sends to it.
    ///  - Refreshes the Zoho access token on demand and retries rejected calls once.
    ///
    /// Examples:
    ///
    ///  $ zoho-inventory-mcp --config zoho.json serve
    ///  $ zoho-inventory-mcp --config zoho.json serve --transport sse --port 8000
    ///
    Serve(mcp::ServeArgs),

    /// Read a resource through a spawned server
    ///
    /// Example:
    ///
    ///  $ zoho-inventory-mcp read inventory://all
    ///
    ///  $ zoho-inventory-mcp read "inventory://sku/LED Strip - XL Booth"
    ///
    ///  $ zoho-inventory-mcp read -o raw inventory://stock/Widget%20A
    ///
    Read(mcp::ReadArgs),

    /// Call a tool through a spawned server
    ///
    /// Example:
    ///
    ///  $ zoho-inventory-mcp call update_stock -a item_name="Widget A" -a quantity=100
    ///
    ///  $ zoho-inventory-mcp call update_stock_by_sku --input '{"sku":"WA-1","quantity":80}'
    ///
    Call(mcp::CallArgs),

    /// List the resources, templates and tools a server exposes
    ///
    /// Example:
    ///
    ///  $ zoho-inventory-mcp list
    ///
    ///  $ zoho-inventory-mcp list --server "stdio:zoho-inventory-mcp serve -d"
    ///
    List(mcp::ServerArgs),

    /// Display version information
    ///
    ///  - Show the version number along with build details including architecture,
    ///
    ///  - OS, linking mode, and compilation settings.
    ///
    Version,
}

pub async fn run(command: Commands, config: &GlobalConfig, name: &str) -> Result<()> {
    match command {
        Commands::Serve(args) => mcp::run_serve(&args, config).await,
        Commands::Read(args) => mcp::run_read(args, config).await,
        Commands::Call(args) => mcp::run_call(args, config).await,
        Commands::List(args) => mcp::run_list(args, config).await,
        Commands::Version => {
            println!("{}", version(name));
            Ok(())
        }
    }
}

/// Get version string with build details
pub fn version(name: &str) -> String {
    let build_type = if cfg!(debug_assertions) { "debug" } else { "release" };
    let link_mode = if cfg!(target_feature = "crt-static") { "static" } else { "dynamic" };
    let target_env = if cfg!(target_env = "gnu") { "gnu" }
        else if cfg!(target_env = "musl") { "musl" }
        else if cfg!(target_env = "msvc") { "msvc" }
        else { "unknown" };

    format!("{} {} {} {} {} {} {}",
        name,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::ARCH,
        std::env::consts::OS,
        target_env,
        link_mode,
        build_type,
    )
}
