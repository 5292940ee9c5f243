//! Server and test-client subcommands
//!
//! - `serve`: run the gateway over stdio or SSE
//! - `read`, `call`, `list`: drive a spawned server through the stdio client

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Value, json};

use crate::config::GlobalConfig;
use crate::mcp::protocol::ToolCallResult;
use crate::mcp::{McpClient, McpGateway, StdioCommand, sse};

// ============================================================================
// Arguments
// ============================================================================

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Transport: stdio, or sse (HTTP with Server-Sent Events)
    #[arg(long, default_value = "stdio")]
    pub transport: Transport,

    /// Port to listen on for the sse transport
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Address to bind for the sse transport
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Transport {
    #[default]
    Stdio,
    Sse,
}

/// Which server the client commands talk to
#[derive(Args, Clone, Debug, Default)]
pub struct ServerArgs {
    /// Server to spawn, as `stdio:command arg1 arg2`
    ///
    /// Defaults to this executable's `serve` with the current configuration.
    ///
    #[arg(long = "server", value_name = "stdio:command")]
    pub server: Option<String>,

    /// Output format: text, json, or raw
    #[arg(short = 'o', long, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct ReadArgs {
    /// Resource URI, e.g. inventory://stock/Widget%20A
    #[arg(value_name = "URI")]
    pub uri: String,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Args, Clone, Debug)]
pub struct CallArgs {
    /// Tool name: update_stock or update_stock_by_sku
    #[arg(value_name = "TOOL")]
    pub tool: String,

    /// Input arguments as JSON object
    ///
    /// Example: --input '{"item_name": "Widget A", "quantity": 100}'
    ///
    #[arg(short = 'i', long, value_name = "JSON")]
    pub input: Option<String>,

    /// Input argument as key=value (can be repeated)
    ///
    /// Values are parsed as JSON if possible, otherwise as strings.
    /// Example: -a item_name="Widget A" -a quantity=100
    ///
    #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Output format for client results
#[derive(Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Raw output (just the content, no formatting)
    Raw,
}

// ============================================================================
// serve
// ============================================================================

pub async fn run_serve(args: &ServeArgs, config: &GlobalConfig) -> Result<()> {
    let gateway = Arc::new(McpGateway::from_config(config).context("Cannot start server")?);
    match args.transport {
        Transport::Stdio => gateway.run().await,
        Transport::Sse => {
            let addr: SocketAddr = format!("{}:{}", args.host, args.port)
                .parse()
                .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
            sse::serve_sse(gateway, addr).await
        }
    }
}

// ============================================================================
// Client commands
// ============================================================================

/// The server to spawn: `--server`, or this binary with our config in `ZOHO_CONFIG`
fn server_command(args: &ServerArgs, config: &GlobalConfig) -> Result<StdioCommand> {
    if let Some(server) = &args.server {
        return StdioCommand::parse(server).context("Invalid --server");
    }

    let exe = std::env::current_exe().context("Cannot locate own executable")?;

    // The child shares our stderr; a second writer would truncate the log file
    let mut child_config = config.clone();
    child_config.log_file = None;

    Ok(StdioCommand {
        command: exe.display().to_string(),
        args: vec!["serve".to_string()],
        env: vec![("ZOHO_CONFIG".to_string(), serde_json::to_string(&child_config)?)],
    })
}

async fn connect(args: &ServerArgs, config: &GlobalConfig) -> Result<McpClient> {
    let client = McpClient::new(server_command(args, config)?);
    client
        .initialize()
        .await
        .context("Failed to connect to MCP server")?;
    Ok(client)
}

pub async fn run_read(args: ReadArgs, config: &GlobalConfig) -> Result<()> {
    let client = connect(&args.server, config).await?;
    let result = client.read_resource(&args.uri).await;
    client.close().await;

    let result = result.with_context(|| format!("Failed to read {}", args.uri))?;
    match args.server.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Raw => {
            for content in &result.contents {
                print!("{}", content.text);
            }
        }
        OutputFormat::Text => {
            for content in &result.contents {
                println!("# {}", content.uri);
                println!("{}", content.text);
            }
        }
    }
    Ok(())
}

pub async fn run_call(args: CallArgs, config: &GlobalConfig) -> Result<()> {
    let mut input = match &args.input {
        Some(input_json) => serde_json::from_str(input_json).context("Invalid JSON in --input")?,
        None => json!({}),
    };
    if !args.args.is_empty() {
        input = merge_json(input, parse_args_to_json(&args.args)?);
    }

    tracing::debug!(tool = %args.tool, input = %input, "Calling tool");

    let client = connect(&args.server, config).await?;
    let result = client.call_tool(&args.tool, input).await;
    client.close().await;

    let result = result.with_context(|| format!("Tool call failed: {}", args.tool))?;
    format_tool_result(&result, &args.server.output)?;
    if result.is_error == Some(true) {
        anyhow::bail!("Tool {} reported an error", args.tool);
    }
    Ok(())
}

pub async fn run_list(args: ServerArgs, config: &GlobalConfig) -> Result<()> {
    let client = connect(&args, config).await?;
    let listing = async {
        Ok::<_, crate::mcp::McpError>((
            client.list_resources().await?,
            client.list_resource_templates().await?,
            client.list_tools().await?,
        ))
    }
    .await;
    client.close().await;
    let (resources, templates, tools) = listing.context("Failed to list server capabilities")?;

    if args.output == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "resources": resources,
                "resourceTemplates": templates,
                "tools": tools,
            }))?
        );
        return Ok(());
    }

    println!("Resources:");
    for r in &resources {
        println!("  {} - {}", r.uri, r.description);
    }
    for t in &templates {
        println!("  {} - {}", t.uri_template, t.description);
    }
    println!();
    println!("Tools:");
    for t in &tools {
        println!("  {} - {}", t.name, t.description);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse key=value arguments into a JSON object
fn parse_args_to_json(args: &[String]) -> Result<Value> {
    let mut obj = serde_json::Map::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid argument format: '{}'. Expected KEY=VALUE", arg))?;

        // JSON when it parses, otherwise a plain string
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        obj.insert(key.to_string(), value);
    }
    Ok(Value::Object(obj))
}

/// Shallow merge, `overlay` keys win
fn merge_json(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            base.extend(overlay);
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

fn format_tool_result(result: &ToolCallResult, output: &OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Raw => print!("{}", result.text()),
        OutputFormat::Text => {
            if result.is_error == Some(true) {
                eprint!("Error: ");
            }
            println!("{}", result.text());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args_to_json() {
        let args = vec!["item_name=Widget A".to_string(), "quantity=100".to_string()];
        let json = parse_args_to_json(&args).unwrap();
        assert_eq!(json, json!({"item_name": "Widget A", "quantity": 100}));
        assert!(parse_args_to_json(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_merge_json_args_win() {
        let merged = merge_json(
            json!({"sku": "A", "quantity": 1}),
            json!({"quantity": 2, "reason": "recount"}),
        );
        assert_eq!(merged, json!({"sku": "A", "quantity": 2, "reason": "recount"}));
    }

    #[test]
    fn test_default_server_passes_config() {
        let config = GlobalConfig {
            organization_id: Some("42".to_string()),
            log_file: Some("/tmp/zoho.log".into()),
            ..GlobalConfig::default()
        };
        let cmd = server_command(&ServerArgs::default(), &config).unwrap();
        assert_eq!(cmd.args, ["serve"]);

        let (key, value) = &cmd.env[0];
        assert_eq!(key, "ZOHO_CONFIG");
        let passed: GlobalConfig = serde_json::from_str(value).unwrap();
        assert_eq!(passed.organization_id.as_deref(), Some("42"));
        assert!(passed.log_file.is_none());
    }

    #[test]
    fn test_explicit_server() {
        let args = ServerArgs {
            server: Some("stdio:zoho-inventory-mcp serve -d".to_string()),
            ..ServerArgs::default()
        };
        let cmd = server_command(&args, &GlobalConfig::default()).unwrap();
        assert_eq!(cmd.command, "zoho-inventory-mcp");
        assert!(cmd.env.is_empty());
    }
}
