//! Error types for screentime-core

use crate::db::migrations::Stage;
use thiserror::Error;

/// Main error type for the screentime-core library
#[derive(Error, Debug)]
pub enum Error {
    /// A migration template placeholder could not be resolved
    #[error("template error: {0}")]
    Template(String),

    /// The provision or views batch failed
    #[error("{stage} migration failed: {source}")]
    Migration {
        stage: Stage,
        #[source]
        source: rusqlite::Error,
    },

    /// The lockdown batch failed; the connection must not be served
    #[error("lockdown migration failed: {0}")]
    Lockdown(#[source] rusqlite::Error),

    /// The engine could not open the target
    #[error("failed to open database {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    /// No usable database handle could be obtained
    #[error("no database available: {0}")]
    NoDatabase(#[source] Box<Error>),

    /// Malformed tool invocation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The SQL executed but failed
    #[error("query failed: {0}")]
    Query(#[source] rusqlite::Error),

    /// Reading rows after execution started failed
    #[error("failed to read result rows: {0}")]
    ResultSet(#[source] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// MCP transport error
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for screentime-core
pub type Result<T> = std::result::Result<T, Error>;
