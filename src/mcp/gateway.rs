//! MCP Gateway - stdio event loop and request routing
//!
//! Reads newline-delimited JSON-RPC from the input stream, routes resource
//! reads to the resolver and tool calls to the dispatcher, and writes one
//! response line per request. Requests are handled concurrently; a single
//! writer task serializes the output. No failed request ends the loop.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::GlobalConfig;
use crate::error::InventoryError;
use crate::inventory::{ResourceResolver, StockQuery, ToolDispatcher};
use crate::zoho::token::initial_token;
use crate::zoho::{CredentialStore, InventoryClient};

use super::protocol::*;
use super::resources::{InventoryResource, MIME_JSON, resource_list, template_list};
use super::tools::{ToolCall, tool_list};

pub const SERVER_NAME: &str = "zoho-inventory";

pub struct McpGateway {
    name: String,
    resolver: ResourceResolver,
    dispatcher: ToolDispatcher,
}

impl McpGateway {
    pub fn new(name: impl Into<String>, resolver: ResourceResolver) -> Self {
        Self {
            name: name.into(),
            dispatcher: ToolDispatcher::new(resolver.clone()),
            resolver,
        }
    }

    /// Wire credentials, token cache and client from validated configuration
    ///
    /// Fails with [`InventoryError::Config`] when a required setting is missing,
    /// before anything is served.
    pub fn from_config(config: &GlobalConfig) -> Result<Self, InventoryError> {
        let credentials = config.credentials()?;
        let persistence = config.token_store();
        let seed = initial_token(config.access_token.as_deref(), persistence.as_ref());

        tracing::debug!(credentials = ?credentials, "Loaded credentials");

        let store = Arc::new(CredentialStore::new(credentials, seed));
        let client = InventoryClient::new(store, persistence, &config.client_options())?;
        Ok(Self::new(SERVER_NAME, ResourceResolver::new(Arc::new(client))))
    }

    /// Serve over the process's stdin/stdout
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches EOF, then drain in-flight requests
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                write_response(&mut writer, &response).await?;
            }
            Ok::<_, anyhow::Error>(())
        });

        tracing::info!(server = %self.name, "Gateway started, waiting for requests");

        let mut lines = BufReader::new(reader).lines();
        let mut in_flight = JoinSet::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(req) => req,
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable request line");
                    let _ = tx.send(JsonRpcResponse::parse_error(&e.to_string()));
                    continue;
                }
            };

            if request.is_notification() {
                self.handle_notification(&request);
                continue;
            }

            let gateway = Arc::clone(&self);
            let tx = tx.clone();
            in_flight.spawn(async move {
                let response = gateway.handle_request(request).await;
                let _ = tx.send(response);
            });

            // Reap finished tasks so the set does not grow for the whole session
            while in_flight.try_join_next().is_some() {}
        }

        tracing::info!("EOF received, shutting down");
        while in_flight.join_next().await.is_some() {}
        drop(tx);
        writer_task.await??;
        Ok(())
    }

    pub(crate) fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::debug!("Client initialized"),
            "notifications/cancelled" => tracing::debug!("Request cancelled"),
            other => tracing::debug!(method = %other, "Ignoring notification"),
        }
    }

    /// Route one request and build its response
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();
        tracing::debug!(method = %req.method, id = ?id, "Request");

        let result = match req.method.as_str() {
            "initialize" => self.handle_initialize(),
            "ping" => Ok(json!({})),
            "resources/list" => to_value(json!({ "resources": resource_list() })),
            "resources/templates/list" => {
                to_value(json!({ "resourceTemplates": template_list() }))
            }
            "resources/read" => self.handle_resources_read(req.params).await,
            "tools/list" => to_value(json!({ "tools": tool_list() })),
            "tools/call" => self.handle_tools_call(req.params).await,
            method => Err(JsonRpcError::method_not_found(method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => {
                tracing::warn!(method = %req.method, error = %error, "Request failed");
                JsonRpcResponse::error(id, error)
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, JsonRpcError> {
        to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ListChanged {
                    list_changed: Some(false),
                }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
            })?;

        let body = self
            .read_resource(&params.uri)
            .await
            .map_err(|e| JsonRpcError::from(&e))?;

        to_value(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: MIME_JSON.to_string(),
                text: pretty(&body),
            }],
        })
    }

    /// Normalized JSON for a resource URI
    pub async fn read_resource(&self, uri: &str) -> Result<Value, InventoryError> {
        let resource = InventoryResource::parse(uri)?;
        tracing::debug!(resource = %resource, "Reading resource");

        let value = match &resource {
            InventoryResource::Stock(query) => {
                let items = self.resolver.stock(query).await?;
                match query {
                    StockQuery::ByName(name) => json!({ "name": name, "items": items }),
                    StockQuery::BySku(sku) => json!({ "sku": sku, "items": items }),
                }
            }
            InventoryResource::AllItems => {
                let items = self.resolver.all_items().await?;
                json!({ "count": items.len(), "items": items })
            }
            InventoryResource::AllWarehouses => {
                let warehouses = self.resolver.all_warehouses().await?;
                json!({ "count": warehouses.len(), "warehouses": warehouses })
            }
            InventoryResource::Warehouse(key) => json!(self.resolver.warehouse(key).await?),
        };
        Ok(value)
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: ToolCallParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
            })?;

        to_value(self.call_tool(&params.name, params.arguments.as_ref()).await)
    }

    /// Run a tool; failures come back in-band with `isError` set
    pub async fn call_tool(&self, name: &str, arguments: Option<&Value>) -> ToolCallResult {
        tracing::info!(tool = %name, "Executing tool");
        match self.execute_tool(name, arguments).await {
            Ok(body) => ToolCallResult::json(&body),
            Err(error) => {
                tracing::warn!(tool = %name, kind = error.kind(), error = %error, "Tool failed");
                ToolCallResult::failure(&error)
            }
        }
    }

    async fn execute_tool(&self, name: &str, arguments: Option<&Value>) -> Result<Value, InventoryError> {
        match ToolCall::parse(name, arguments)? {
            ToolCall::UpdateStock(request) => {
                let outcome = self.dispatcher.update_stock(&request).await?;
                Ok(json!({
                    "success": true,
                    "message": format!("Updated stock for {} to {}", outcome.name, outcome.quantity),
                    "item": outcome.item,
                }))
            }
            ToolCall::UpdateStockBySku(request) => {
                let outcome = self.dispatcher.update_stock_by_sku(&request).await?;
                let message = if outcome.adjustment.is_some() {
                    format!(
                        "Adjusted stock for SKU {} by {} to {}",
                        outcome.sku, outcome.delta, outcome.quantity
                    )
                } else {
                    format!("Stock for SKU {} already at {}", outcome.sku, outcome.quantity)
                };
                Ok(json!({
                    "success": true,
                    "message": message,
                    "adjustment": outcome,
                }))
            }
        }
    }
}

fn to_value(value: impl serde::Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal(e.to_string()))
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let output = serde_json::to_string(response)?;
    writer.write_all(output.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
