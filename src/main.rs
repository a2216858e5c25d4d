//! Taskflow MCP Server
//!
//! Task management over MCP: hierarchical tasks with dependency gating,
//! templates, an AI context layer and natural-language commands.

use anyhow::Result;
use clap::Parser;
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::sync::Arc;
use taskflow_mcp::cli::{self, Cli, Command};
use taskflow_mcp::config::Config;
use taskflow_mcp::db::Database;
use taskflow_mcp::engine::Engine;
use taskflow_mcp::error::ToolError;
use taskflow_mcp::logging::{LogLevelFilter, Logger};
use taskflow_mcp::tools::ToolHandler;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// MCP server handler.
#[derive(Clone)]
struct TaskflowServer {
    tool_handler: Arc<ToolHandler>,
    /// Client-adjustable level for log notifications.
    level_filter: Arc<LogLevelFilter>,
}

const INSTRUCTIONS: &str = "\
Task manager with projects, subtasks, dependencies and templates. \
Start with context_summary or suggestions, set_active_task on what you work on, \
update_status when done. nlp_query accepts plain-language commands.";

impl ServerHandler for TaskflowServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "taskflow-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                logging: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn set_level(
        &self,
        request: rmcp::model::SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        self.level_filter.set(request.level);
        info!(level = ?request.level, "Logging level updated via MCP");
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.clone();
        let start = std::time::Instant::now();

        let logger = Logger::new(Arc::clone(&self.level_filter))
            .with_peer(context.peer.clone())
            .with_name(format!("tool:{}", tool_name));

        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args).await {
            Ok(result) => {
                let elapsed = start.elapsed();
                debug!(tool = %tool_name, duration_ms = elapsed.as_millis() as u64, "Tool call succeeded");
                Ok(CallToolResult {
                    content: vec![Content::text(response_text(result))],
                    is_error: None,
                    meta: None,
                    structured_content: None,
                })
            }
            Err(e) => {
                let elapsed = start.elapsed();
                let tool_err = ToolError::from(e);
                warn!(
                    tool = %tool_name,
                    error_code = ?tool_err.code,
                    error_message = %tool_err.message,
                    duration_ms = elapsed.as_millis() as u64,
                    "Tool call failed"
                );
                logger.tool_failure(&tool_name, &tool_err);
                let error_json = serde_json::to_string(&tool_err)
                    .unwrap_or_else(|_| json!({ "error": tool_err.to_string() }).to_string());
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }
}

/// Markdown responses go out as their text, everything else as JSON.
fn response_text(result: Value) -> String {
    if result.get("format").and_then(Value::as_str) == Some("markdown") {
        if let Some(md) = result.get("content").and_then(Value::as_str) {
            return md.to_string();
        }
    }
    serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    // RUST_LOG wins over --verbose when set.
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
    };
    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new().create(true).append(true).open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    Database::open(&config.server.db_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    let config = cli.load_config()?;

    match cli.command {
        Some(Command::Export(ref args)) => {
            let db = open_database(&config)?;
            cli::export::run(&db, args, config.export.pretty)?;
        }
        Some(Command::Import(ref args)) => {
            let db = open_database(&config)?;
            let result = cli::import::run(&db, args)?;
            if !result.success {
                anyhow::bail!("import failed");
            }
        }
        Some(Command::Templates) => {
            cli::run_templates(open_database(&config)?, &config)?;
        }
        Some(Command::IdeConfig(ref args)) => {
            cli::run_ide_config(args)?;
        }
        Some(Command::Serve) | None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

/// Run the MCP server
async fn run_server(config: Config) -> Result<()> {
    info!("Starting Taskflow MCP Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {:?}", config.server.db_path);

    let db = open_database(&config)?;
    info!("Database initialized successfully");

    let engine = Engine::new(db, &config)?;
    if let Err(e) = engine.watcher.start() {
        warn!(error = %e, "file watcher not started");
    }
    let tool_handler = ToolHandler::new(engine.clone(), config.output_format(), config.export.pretty);
    let server = TaskflowServer {
        tool_handler: Arc::new(tool_handler),
        level_filter: Arc::new(LogLevelFilter::default()),
    };

    info!("Server ready, listening on stdio");
    let service = server.serve(stdio()).await?;
    let outcome = service.waiting().await;
    engine.shutdown();
    outcome?;

    Ok(())
}
