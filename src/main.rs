use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pubmed_mcp::config::{load_config, Config};
use pubmed_mcp::mcp::{McpServer, SearchAbstractsHandler, ToolRegistry};
use pubmed_mcp::sources::PubMedSource;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PubMed MCP - search PubMed abstracts over the Model Context Protocol
#[derive(Parser, Debug)]
#[command(name = "pubmed-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stateless MCP server exposing PubMed abstract search", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (default: ./pubmed-mcp.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides LOG_LEVEL
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (default)
    Serve(ServeArgs),

    /// Run one search and print the abstracts
    #[command(alias = "s")]
    Search(SearchArgs),

    /// Print the effective configuration as TOML (API key masked)
    Config,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, short)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Reply with JSON bodies instead of SSE streams
    #[arg(long)]
    json_response: bool,

    /// Serve over stdio instead of HTTP
    #[arg(long, conflicts_with_all = ["port", "host", "json_response"])]
    stdio: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Entrez text query
    term: String,

    /// Number of results
    #[arg(long, short = 'n')]
    retmax: Option<u32>,

    /// Sort order (pub_date, author, journal_name, relevance)
    #[arg(long)]
    sort: Option<String>,

    /// Restrict the search to one field (e.g. title)
    #[arg(long)]
    field: Option<String>,

    /// Date type for date filters (mdat, pdat, edat)
    #[arg(long)]
    datetype: Option<String>,

    /// Only items from the last N days
    #[arg(long)]
    reldate: Option<u32>,

    /// Start of date range (YYYY/MM/DD, YYYY/MM or YYYY)
    #[arg(long)]
    mindate: Option<String>,

    /// End of date range (YYYY/MM/DD, YYYY/MM or YYYY)
    #[arg(long)]
    maxdate: Option<String>,

    /// Print the full tool result as JSON
    #[arg(long)]
    json: bool,
}

impl SearchArgs {
    /// Tool arguments, exactly as an MCP client would send them
    fn to_arguments(&self) -> Value {
        let mut args = Map::new();
        args.insert("term".to_string(), json!(self.term));

        if let Some(retmax) = self.retmax {
            args.insert("retmax".to_string(), json!(retmax));
        }
        if let Some(reldate) = self.reldate {
            args.insert("reldate".to_string(), json!(reldate));
        }
        for (key, value) in [
            ("sort", &self.sort),
            ("field", &self.field),
            ("datetype", &self.datetype),
            ("mindate", &self.mindate),
            ("maxdate", &self.maxdate),
        ] {
            if let Some(value) = value {
                args.insert(key.to_string(), json!(value));
            }
        }

        Value::Object(args)
    }
}

fn init_tracing(level: &str) {
    // stderr keeps stdout clean for the stdio transport
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("pubmed_mcp={level},pmcp={level}")),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_registry(config: &Config) -> Result<ToolRegistry> {
    let source = PubMedSource::new(&config.upstream).context("Failed to create HTTP client")?;
    Ok(ToolRegistry::new(Arc::new(source)))
}

async fn serve(config: Config, args: ServeArgs) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if let Some(host) = args.host {
        server_config.host = host;
    }
    server_config.json_response |= args.json_response;

    let registry = build_registry(&config)?;
    let server = McpServer::new(&registry)?;

    if args.stdio {
        server.run_stdio().await?;
        return Ok(());
    }

    let addr = server_config.socket_addr()?;
    let (bound_addr, handle) = server.run_http(addr, server_config.json_response).await?;
    tracing::info!("MCP server listening on http://{}/", bound_addr);

    tokio::select! {
        joined = handle => {
            joined.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

async fn search(config: Config, args: SearchArgs) -> Result<()> {
    let registry = build_registry(&config)?;
    let output = registry
        .invoke(SearchAbstractsHandler::TOOL_NAME, args.to_arguments())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if let Some(text) = output["text"].as_str() {
        println!("{}", text);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.server.log_level = level;
        config = config.validate()?;
    }

    init_tracing(&config.server.log_level);
    tracing::debug!(
        host = %config.server.host,
        port = config.server.port,
        upstream = %config.upstream.base_url,
        api_key = config.upstream.api_key.is_some(),
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => serve(config, args).await,
        Commands::Search(args) => search(config, args).await,
        Commands::Config => {
            print!("{}", config.redacted().to_toml()?);
            Ok(())
        }
    }
}
