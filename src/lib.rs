// Library interface for zoho-inventory-mcp
// The binary and the integration tests import the modules from here

pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod mcp;
pub mod zoho;
