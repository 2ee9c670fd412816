//! # PubMed MCP
//!
//! A stateless Model Context Protocol (MCP) server exposing one tool,
//! `search_abstracts`, which searches PubMed through the NCBI E-utilities API.
//!
//! ## Architecture
//!
//! - [`models`]: Validated search requests, citations and search results
//! - [`sources`]: The upstream seam ([`Source`]) and its PubMed implementation
//! - [`mcp`]: Tool registry, the search tool, and pmcp server wiring
//! - [`utils`]: Pooled HTTP client and bounded retry
//! - [`config`]: Configuration management

pub mod config;
pub mod mcp;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use mcp::{McpServer, ToolError, ToolRegistry};
pub use models::{Citation, SearchRequest, SearchResult};
pub use sources::{PubMedSource, Source};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
