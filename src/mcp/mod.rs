//! MCP (Model Context Protocol) implementation.

mod search;
pub mod server;
mod tools;

pub use search::SearchAbstractsHandler;
pub use server::McpServer;
pub use tools::{Tool, ToolDescriptor, ToolError, ToolHandler, ToolRegistry};
