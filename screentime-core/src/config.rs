//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/screentime-mcp/config.toml`.
//! Every field has a default, so the file is optional. Command line flags
//! are layered on top by the binary.

use crate::db::{DatabaseTarget, Mode};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Database target and provisioning behavior
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// MCP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:` for an in-memory database
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Development mode: fresh connection per call, provision failures tolerated
    #[serde(default)]
    pub dev_mode: bool,

    /// Directory holding `provision.sql`, `views.sql` and `lockdown.sql`.
    /// When unset the scripts compiled into the binary are used.
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            dev_mode: false,
            migrations_dir: None,
        }
    }
}

impl DatabaseConfig {
    /// The parsed database target
    pub fn target(&self) -> DatabaseTarget {
        DatabaseTarget::parse(&self.path)
    }

    /// The operating mode selected by `dev_mode`
    pub fn mode(&self) -> Mode {
        if self.dev_mode {
            Mode::Development
        } else {
            Mode::Production
        }
    }
}

fn default_database_path() -> String {
    DatabaseTarget::IN_MEMORY.to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,

    /// Log file to append to. Logs go to stderr when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which MCP transport to serve
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// HTTP with server-sent events
    Sse,
}

/// MCP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Transport to serve
    #[serde(default)]
    pub transport: Transport,

    /// `host:port` for the SSE transport; a bare `:port` binds all interfaces
    #[serde(default = "default_sse_host_port")]
    pub sse_host_port: String,

    /// Exit after the first tool call
    #[serde(default)]
    pub one_shot: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            sse_host_port: default_sse_host_port(),
            one_shot: false,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind for the SSE transport
    pub fn bind_addr(&self) -> String {
        if self.sse_host_port.starts_with(':') {
            format!("0.0.0.0{}", self.sse_host_port)
        } else {
            self.sse_host_port.clone()
        }
    }
}

fn default_sse_host_port() -> String {
    ":8889".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::debug!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/screentime-mcp/config.toml` (~/.config/screentime-mcp/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("screentime-mcp").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.database.target(), DatabaseTarget::InMemory);
        assert_eq!(config.database.mode(), Mode::Production);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.transport, Transport::Stdio);
        assert!(!config.server.one_shot);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
path = "/tmp/screentime.db"
dev_mode = true
migrations_dir = "./sql"

[logging]
level = "debug"
json = true

[server]
transport = "sse"
sse_host_port = "127.0.0.1:9000"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.database.target(),
            DatabaseTarget::File(PathBuf::from("/tmp/screentime.db"))
        );
        assert_eq!(config.database.mode(), Mode::Development);
        assert_eq!(config.database.migrations_dir, Some(PathBuf::from("./sql")));
        assert!(config.logging.json);
        assert_eq!(config.server.transport, Transport::Sse);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_bind_addr_for_bare_port() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_addr(), "0.0.0.0:8889");
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/screentime.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
