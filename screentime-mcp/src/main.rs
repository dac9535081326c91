//! screentime-mcp - MCP server for macOS Screen Time data
//!
//! Exposes a single `screentime_sql` tool that runs read-only SQL against
//! the Knowledge store and answers in CSV.
//!
//! File locations follow the XDG Base Directory layout:
//! - Config: $XDG_CONFIG_HOME/screentime-mcp/config.toml (~/.config/screentime-mcp/config.toml)
//! - Logs: stderr, or the file named by --log-file / MCP_LOG_FILE

use anyhow::{Context, Result};
use clap::Parser;
use screentime_core::config::Transport;
use screentime_core::logging::LOG_FILE_ENV;
use screentime_core::mcp::sse;
use screentime_core::{Config, ConnectionManager, McpServer, Mode, QueryTool};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "screentime-mcp")]
#[command(about = "MCP server exposing macOS Screen Time data through SQL")]
#[command(version)]
struct Args {
    /// Database file to open read-only, or :memory:
    #[arg(long, value_name = "PATH")]
    db: Option<String>,

    /// Development mode: fresh connection per query, provision failures tolerated
    #[arg(short, long)]
    dev: bool,

    /// Directory with provision.sql, views.sql and lockdown.sql
    #[arg(long, value_name = "DIR")]
    migrations_dir: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(short, long, env = LOG_FILE_ENV, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(short = 'j', long)]
    log_json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Serve MCP over HTTP/SSE instead of stdio
    #[arg(long)]
    sse: bool,

    /// host:port for the SSE transport (a bare :port binds all interfaces)
    #[arg(long, value_name = "HOST:PORT")]
    sse_host: Option<String>,

    /// Exit shortly after the first tool call
    #[arg(short = 'o', long)]
    once: bool,

    /// Config file to load instead of the default location
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    /// Layer command line flags over the loaded configuration
    fn apply(self, mut config: Config) -> Config {
        if let Some(db) = self.db {
            config.database.path = db;
        }
        if self.dev {
            config.database.dev_mode = true;
        }
        if let Some(dir) = self.migrations_dir {
            config.database.migrations_dir = Some(dir);
        }
        if let Some(file) = self.log_file {
            config.logging.file = Some(file);
        }
        if self.log_json {
            config.logging.json = true;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        if self.sse {
            config.server.transport = Transport::Sse;
        }
        if let Some(host_port) = self.sse_host {
            config.server.sse_host_port = host_port;
        }
        if self.once {
            config.server.one_shot = true;
        }
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration, then let flags win
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    let config = args.apply(config);

    // Initialize logging (never to stdout, which carries the stdio transport)
    let _log_guard = screentime_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database.target(),
        mode = ?config.database.mode(),
        "screentime-mcp starting"
    );

    let manager = Arc::new(ConnectionManager::from_config(&config.database));

    // Open once up front so a broken setup fails before any client connects
    match manager.get_connection() {
        Ok(_) => tracing::info!("Startup database check passed"),
        Err(e) if manager.mode() == Mode::Development => {
            tracing::warn!(error = %e, "Startup database check failed, continuing in development mode");
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup database check failed");
            return Err(e).context("failed to open database");
        }
    }

    let server = McpServer::new(QueryTool::new(manager))
        .with_server_info("screentime-mcp", env!("CARGO_PKG_VERSION"))
        .with_one_shot(config.server.one_shot);

    let result = match config.server.transport {
        Transport::Stdio => server.run_stdio().context("stdio transport failed"),
        Transport::Sse => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            let addr = config.server.bind_addr();
            runtime
                .block_on(sse::serve(Arc::new(server), &addr))
                .context("SSE transport failed")
        }
    };

    tracing::info!("screentime-mcp shutting down");

    result
}
