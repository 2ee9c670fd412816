//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::mcp::search::SearchAbstractsHandler;
use crate::models::ArgumentError;
use crate::sources::{Source, SourceError};

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_abstracts")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// JSON Schema for the handler's result, when it has a fixed shape
    pub output_schema: Option<Value>,

    /// Handler that executes the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .finish()
    }
}

/// What `tools/list` advertises for one tool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Errors surfaced by tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Caller supplied a missing, malformed or out-of-range argument
    #[error(transparent)]
    InvalidArgument(#[from] ArgumentError),

    /// No tool is registered under this name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Upstream unreachable, timed out or failing; safe to retry later
    #[error("PubMed is unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream declared the query invalid; retrying unchanged will not help
    #[error("PubMed rejected the query: {0}")]
    UpstreamRejected(String),
}

impl ToolError {
    /// The offending argument name, for `InvalidArgument`
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ToolError::InvalidArgument(err) => Some(err.field),
            _ => None,
        }
    }

    /// Whether the caller is at fault (as opposed to the upstream service)
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidArgument(_) | ToolError::UnknownTool(_)
        )
    }
}

impl From<SourceError> for ToolError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Rejected { message, .. } => ToolError::UpstreamRejected(message),
            other => ToolError::UpstreamUnavailable(other.to_string()),
        }
    }
}

/// Registry for all MCP tools
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create a registry exposing `search_abstracts` over the given source
    pub fn new(source: Arc<dyn Source>) -> Self {
        let mut registry = Self::empty();

        registry.register(Tool {
            name: SearchAbstractsHandler::TOOL_NAME.to_string(),
            description: SearchAbstractsHandler::DESCRIPTION.to_string(),
            input_schema: SearchAbstractsHandler::input_schema(),
            output_schema: Some(SearchAbstractsHandler::output_schema()),
            handler: Arc::new(SearchAbstractsHandler::new(source)),
        });

        registry
    }

    /// A registry with no tools
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Descriptors for every registered tool, sorted by name
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.all().into_iter().map(Tool::descriptor).collect()
    }

    /// Get all tools, sorted by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name, returning its result verbatim
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.handler.execute(args).await
    }
}
