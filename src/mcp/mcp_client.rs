//! Stdio MCP client used by the `read`, `call` and `list` commands
//!
//! Spawns the server as a child process and exchanges one JSON-RPC line per
//! call over its stdin/stdout.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::protocol::{
    JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
    ReadResourceResult, ResourceInfo, ResourceTemplateInfo, ToolCallResult, ToolInfo,
};

// ============================================================================
// Transport
// ============================================================================

/// Command line of the server process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioCommand {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment for the child, on top of the inherited one
    pub env: Vec<(String, String)>,
}

impl StdioCommand {
    /// Parse `stdio:command arg1 arg2`
    pub fn parse(server: &str) -> Result<Self, McpError> {
        let Some(cmd_str) = server.strip_prefix("stdio:") else {
            return Err(McpError::Transport(format!(
                "Invalid MCP server: {}. Must start with stdio:",
                server
            )));
        };
        let mut parts = cmd_str.split_whitespace().map(str::to_string);
        let command = parts
            .next()
            .ok_or_else(|| McpError::Transport("Empty stdio command".to_string()))?;
        Ok(Self {
            command,
            args: parts.collect(),
            env: Vec::new(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Spawn, pipe or framing failure
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("RPC error ({}): {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Client
// ============================================================================

struct StdioState {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct McpClient {
    command: StdioCommand,
    request_id: AtomicU64,
    state: Mutex<Option<StdioState>>,
}

impl McpClient {
    pub fn new(command: StdioCommand) -> Self {
        Self {
            command,
            request_id: AtomicU64::new(1),
            state: Mutex::new(None),
        }
    }

    /// Handshake; must precede every other call
    pub async fn initialize(&self) -> Result<Value, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "zoho-inventory-mcp-client",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.call_method("initialize", Some(params)).await?;
        self.notify("notifications/initialized").await?;
        Ok(result)
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError> {
        #[derive(Deserialize)]
        struct Listing {
            resources: Vec<ResourceInfo>,
        }
        let listing: Listing = parse(self.call_method("resources/list", None).await?)?;
        Ok(listing.resources)
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>, McpError> {
        #[derive(Deserialize)]
        struct Listing {
            #[serde(rename = "resourceTemplates")]
            resource_templates: Vec<ResourceTemplateInfo>,
        }
        let listing: Listing = parse(self.call_method("resources/templates/list", None).await?)?;
        Ok(listing.resource_templates)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        parse(
            self.call_method("resources/read", Some(json!({ "uri": uri })))
                .await?,
        )
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        #[derive(Deserialize)]
        struct Listing {
            tools: Vec<ToolInfo>,
        }
        let listing: Listing = parse(self.call_method("tools/list", None).await?)?;
        Ok(listing.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        parse(self.call_method("tools/call", Some(params)).await?)
    }

    /// Kill the server process
    pub async fn close(&self) {
        if let Some(mut state) = self.state.lock().await.take() {
            let _ = state.child.kill().await;
        }
    }

    async fn call_method(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = JsonRpcId::Number(self.request_id.fetch_add(1, Ordering::SeqCst) as i64);
        let request = JsonRpcRequest::new(id.clone(), method, params);

        tracing::debug!(method = %method, id = %id, "-> request");

        let mut guard = self.connected().await?;
        let state = guard
            .as_mut()
            .ok_or_else(|| McpError::Transport("Not connected".to_string()))?;
        write_line(&mut state.stdin, &request).await?;

        loop {
            let mut line = String::new();
            let read = state
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::Transport(format!("Read failed: {}", e)))?;
            if read == 0 {
                return Err(McpError::Transport("Server closed its output".to_string()));
            }
            if line.trim().is_empty() {
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_str(&line)
                .map_err(|e| McpError::Transport(format!("Invalid response: {}", e)))?;

            // A parse-error reply carries no id; anything else must match
            if response.id.is_some() && response.id.as_ref() != Some(&id) {
                tracing::debug!(id = ?response.id, "Skipping response for another request");
                continue;
            }

            tracing::debug!(method = %method, "<- response");
            if let Some(error) = response.error {
                return Err(McpError::Rpc(error));
            }
            return response
                .result
                .ok_or_else(|| McpError::Transport("Response has neither result nor error".to_string()));
        }
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let mut guard = self.connected().await?;
        let state = guard
            .as_mut()
            .ok_or_else(|| McpError::Transport("Not connected".to_string()))?;
        write_line(&mut state.stdin, &JsonRpcRequest::notification(method)).await
    }

    /// Lock the connection, spawning the server on first use
    async fn connected(&self) -> Result<tokio::sync::MutexGuard<'_, Option<StdioState>>, McpError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Ok(state);
        }

        tracing::debug!(command = %self.command.command, args = ?self.command.args, "Spawning server");

        let mut child = Command::new(&self.command.command)
            .args(&self.command.args)
            .envs(self.command.env.iter().map(|(k, v)| (k, v)))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Transport(format!("Failed to spawn process: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("Failed to get stdout".to_string()))?;

        *state = Some(StdioState {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        Ok(state)
    }
}

async fn write_line(stdin: &mut ChildStdin, request: &JsonRpcRequest) -> Result<(), McpError> {
    let mut line = serde_json::to_string(request)
        .map_err(|e| McpError::Internal(format!("Failed to serialize request: {}", e)))?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| McpError::Transport(format!("Write failed: {}", e)))?;
    stdin
        .flush()
        .await
        .map_err(|e| McpError::Transport(format!("Flush failed: {}", e)))
}

fn parse<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| McpError::Internal(format!("Failed to parse result: {}", e)))
}
