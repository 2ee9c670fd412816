//! MCP server implementation using pmcp (Pragmatic AI's rust-mcp-sdk).
//!
//! JSON-RPC framing, StreamableHTTP and SSE are handled by pmcp; this module
//! only adapts the [`ToolRegistry`] to pmcp's tool handlers.

use crate::mcp::tools::{Tool, ToolError, ToolHandler as RegistryToolHandler, ToolRegistry};
use async_trait::async_trait;
use pmcp::{
    server::streamable_http_server::{StreamableHttpServer, StreamableHttpServerConfig},
    Error, RequestHandlerExtra, Server, ServerCapabilities, ToolHandler, ToolInfo,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Name reported in the `initialize` handshake
pub const SERVER_NAME: &str = "pubmed-mcp";

/// The PubMed MCP server
#[derive(Debug, Clone)]
pub struct McpServer {
    server: Arc<Mutex<Server>>,
}

impl McpServer {
    /// Create a new MCP server exposing the registry's tools
    pub fn new(tools: &ToolRegistry) -> Result<Self, pmcp::Error> {
        let server = Self::build_server(tools)?;
        Ok(Self {
            server: Arc::new(Mutex::new(server)),
        })
    }

    fn build_server(tools: &ToolRegistry) -> Result<Server, pmcp::Error> {
        let mut builder = Server::builder()
            .name(SERVER_NAME)
            .version(env!("CARGO_PKG_VERSION"))
            .capabilities(ServerCapabilities::default());

        for tool in tools.all() {
            let wrapper = ToolWrapper::from(tool);
            builder = builder.tool(wrapper.name.clone(), wrapper);
        }

        builder.build()
    }

    /// Run the server over stdio
    pub async fn run_stdio(self) -> Result<(), pmcp::Error> {
        tracing::info!("Starting MCP server in stdio mode");

        // run_stdio() takes ownership of the Server
        let server = Arc::try_unwrap(self.server)
            .map_err(|_| Error::internal("MCP server is shared; cannot move it to stdio"))?
            .into_inner();

        server.run_stdio().await
    }

    /// Serve StreamableHTTP on `addr` without sessions.
    ///
    /// No session id is generated, so every POST is handled on its own. With
    /// `json_response` the reply is a single JSON body, otherwise an SSE stream.
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn run_http(
        &self,
        addr: SocketAddr,
        json_response: bool,
    ) -> Result<(SocketAddr, JoinHandle<()>), pmcp::Error> {
        tracing::info!(
            "Starting MCP server in stateless StreamableHTTP mode on {} ({} responses)",
            addr,
            if json_response { "JSON" } else { "SSE" }
        );

        let config = StreamableHttpServerConfig {
            session_id_generator: None,
            enable_json_response: json_response,
            ..Default::default()
        };

        let http_server = StreamableHttpServer::with_config(addr, self.server.clone(), config);
        http_server.start().await
    }
}

/// Wrapper for adapting our Tool to pmcp's ToolHandler
#[derive(Clone)]
struct ToolWrapper {
    name: String,
    description: Option<String>,
    input_schema: Value,
    output_schema: Option<Value>,
    handler: Arc<dyn RegistryToolHandler>,
}

impl From<&Tool> for ToolWrapper {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            description: Some(tool.description.clone()),
            input_schema: tool.input_schema.clone(),
            output_schema: tool.output_schema.clone(),
            handler: tool.handler.clone(),
        }
    }
}

/// Map a tool failure onto the protocol error the client sees
///
/// pmcp answers every handler error with JSON-RPC code -32603 and the error's
/// display text as the message, so the classification travels in the text:
/// caller errors read `Protocol error: -32602 - invalid argument '<field>': ...`.
fn to_protocol_error(err: ToolError) -> Error {
    if err.is_caller_error() {
        Error::invalid_params(err.to_string())
    } else {
        Error::internal(err.to_string())
    }
}

#[async_trait]
impl ToolHandler for ToolWrapper {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<Value, Error> {
        self.handler.execute(args).await.map_err(|e| {
            tracing::warn!(tool = %self.name, "Tool call failed: {}", e);
            to_protocol_error(e)
        })
    }

    fn metadata(&self) -> Option<ToolInfo> {
        let info = ToolInfo::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        );
        Some(match &self.output_schema {
            Some(schema) => info.with_output_schema(schema.clone()),
            None => info,
        })
    }
}
