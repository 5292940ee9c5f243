use anyhow::Result;
use clap::{Parser, Subcommand};

use zoho_inventory_mcp::{cli, config};

const NAME: &str = "zoho-inventory-mcp";

#[derive(Parser)]
#[command(name = "zoho-inventory-mcp")]
#[command(about = "MCP server exposing Zoho Inventory stock as resources and tools")]
#[command(long_about = "\
MCP server exposing Zoho Inventory stock as resources and tools

Speaks JSON-RPC over stdio, or over HTTP with Server-Sent Events
(serve --transport sse). Stock lookups are resources addressed by
inventory:// URIs; stock changes are tools. The Zoho access token is refreshed
from the configured refresh token whenever it expires or is rejected.

TYPICAL WORKFLOWS:

  Serving (from an MCP host):
    zoho-inventory-mcp --config zoho.json serve
    zoho-inventory-mcp --config zoho.json serve --transport sse --port 8000

  Trying it from a shell:
    zoho-inventory-mcp --config zoho.json list
    zoho-inventory-mcp --config zoho.json read inventory://warehouses
    zoho-inventory-mcp --config zoho.json call update_stock -a item_name=\"Widget A\" -a quantity=100

For more details on each command, use: zoho-inventory-mcp <command> --help
")]
struct Cli {
    /// Global configuration arguments
    #[command(flatten)]
    config: config::ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all commands and subcommands (hidden, for tooling)
    #[command(hide = true)]
    ListCommands,

    #[command(flatten)]
    Inventory(cli::Commands),
}

/// List all commands and their subcommands for tooling/scripting
///
/// Output format: `command` or `command:sub1 sub2 sub3`
///
fn list_commands() {
    use clap::CommandFactory;

    let cmd = Cli::command();

    for subcmd in cmd.get_subcommands() {
        let name = subcmd.get_name();
        if name == "help" || name == "list-commands" {
            continue;
        }

        let sub_names: Vec<&str> = subcmd
            .get_subcommands()
            .filter(|s| s.get_name() != "help")
            .map(|s| s.get_name())
            .collect();

        if sub_names.is_empty() {
            println!("{}", name);
        } else {
            println!("{}:{}", name, sub_names.join(" "));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let global_config = config::GlobalConfig::from_args(&cli.config)?;
    global_config.init_tracing();

    tracing::debug!("{} starting", NAME);

    match cli.command {
        Commands::ListCommands => list_commands(),
        Commands::Inventory(cmd) => cli::run(cmd, &global_config, NAME).await?,
    }

    tracing::debug!("{} shutting down", NAME);
    Ok(())
}
