//! MCP (Model Context Protocol) surface over the catalog.

mod server;
mod types;

pub use server::run_mcp_server;
