//! MCP front-end for the inventory adapter
//!
//! JSON-RPC over stdio, or over HTTP with Server-Sent Events ([`sse`]).
//! Resources are addressed by `inventory://` URIs and resolved through [`crate::inventory::ResourceResolver`]; tools run through
//! [`crate::inventory::ToolDispatcher`].
//!
//! # Example
//!
//! ```bash
//! # Serve over stdio
//! zoho-inventory-mcp serve
//!
//! # Serve over SSE on port 8000
//! zoho-inventory-mcp serve --transport sse --port 8000
//!
//! # Read a resource through a spawned server
//! zoho-inventory-mcp read "inventory://sku/LED Strip - XL Booth"
//! ```

pub mod gateway;
pub mod mcp_client;
pub mod protocol;
pub mod resources;
pub mod sse;
pub mod tools;

pub use gateway::McpGateway;
pub use mcp_client::{McpClient, McpError, StdioCommand};
pub use resources::InventoryResource;
pub use tools::ToolCall;
