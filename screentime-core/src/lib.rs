//! # screentime-core
//!
//! Core library for screentime-mcp - SQL access to macOS Screen Time data
//! over the Model Context Protocol.
//!
//! This library provides:
//! - A migration engine that provisions, shapes and locks down a connection
//! - A connection manager with cached (production) and fresh (development) policies
//! - CSV serialization of query results
//! - The `screentime_sql` tool and its MCP transports
//!
//! ## Migrations
//!
//! Every connection goes through three stages before it is served:
//! - **Provision:** attach the Knowledge store read-only (templated with the home directory)
//! - **Views:** create the friendly temp views
//! - **Lockdown:** make the connection query-only and deny attach or pragma changes
//!
//! ## Example
//!
//! ```rust,no_run
//! use screentime_core::{Config, ConnectionManager, QueryRequest, QueryTool};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let manager = Arc::new(ConnectionManager::from_config(&config.database));
//!
//! let tool = QueryTool::new(manager);
//! let csv = tool
//!     .handle(&QueryRequest::new("SELECT bundle_id FROM app_usage LIMIT 5"))
//!     .expect("query failed");
//! print!("{}", csv);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{ConnectionManager, Database, DatabaseTarget, Mode};
pub use error::{Error, Result};
pub use mcp::McpServer;
pub use tool::{QueryRequest, QueryTool};

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod query;
pub mod tool;
