//! Connection lifecycle
//!
//! The [`ConnectionManager`] is built once at startup and shared by
//! reference. It picks one of two policies at construction:
//!
//! - **production**: open, provision and lock down a single handle on first
//!   use, then hand out that same handle forever.
//! - **development**: open a fresh, fully provisioned handle on every call so
//!   edited migration scripts take effect immediately.

use super::migrations::{self, MigrationSource, TemplateContext};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::query;
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operating mode, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Production,
    Development,
}

/// What to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// A private in-memory database
    InMemory,
    /// A database file, always opened read-only
    File(PathBuf),
}

impl DatabaseTarget {
    /// Sentinel selecting an in-memory database
    pub const IN_MEMORY: &'static str = ":memory:";

    /// Parse a target string; empty or `:memory:` means in-memory
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        if target.is_empty() || target == Self::IN_MEMORY {
            DatabaseTarget::InMemory
        } else {
            DatabaseTarget::File(PathBuf::from(target))
        }
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match self {
            DatabaseTarget::InMemory => Connection::open_in_memory(),
            DatabaseTarget::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        };

        conn.map_err(|source| Error::Connection {
            target: self.to_string(),
            source,
        })
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseTarget::InMemory => f.write_str(Self::IN_MEMORY),
            DatabaseTarget::File(path) => write!(f, "{} (read-only)", path.display()),
        }
    }
}

/// A provisioned, locked-down connection
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `sql` and return its result as CSV
    pub fn query(&self, sql: &str) -> Result<String> {
        let conn = self.connection();
        query::execute(&conn, sql)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

enum ConnectionPolicy {
    /// One handle, opened on first use
    Cached(Mutex<Option<Arc<Database>>>),
    /// A new handle per call
    AlwaysFresh,
}

/// Owns the database handle served to queries
pub struct ConnectionManager {
    target: DatabaseTarget,
    migrations: MigrationSource,
    context: TemplateContext,
    mode: Mode,
    policy: ConnectionPolicy,
}

impl ConnectionManager {
    pub fn new(
        target: DatabaseTarget,
        migrations: MigrationSource,
        context: TemplateContext,
        mode: Mode,
    ) -> Self {
        let policy = match mode {
            Mode::Production => ConnectionPolicy::Cached(Mutex::new(None)),
            Mode::Development => ConnectionPolicy::AlwaysFresh,
        };

        Self {
            target,
            migrations,
            context,
            mode,
            policy,
        }
    }

    /// Build a manager from configuration and the process environment
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let migrations = match &config.migrations_dir {
            Some(dir) => MigrationSource::Directory(dir.clone()),
            None => MigrationSource::Embedded,
        };

        Self::new(
            config.target(),
            migrations,
            TemplateContext::from_environment(),
            config.mode(),
        )
    }

    pub fn target(&self) -> &DatabaseTarget {
        &self.target
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Get a servable handle, opening one if the policy requires it
    pub fn get_connection(&self) -> Result<Arc<Database>> {
        match &self.policy {
            ConnectionPolicy::AlwaysFresh => self.open().map(Arc::new),
            ConnectionPolicy::Cached(slot) => {
                // Held across the open so concurrent first calls share one handle.
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(db) = slot.as_ref() {
                    return Ok(Arc::clone(db));
                }

                let db = Arc::new(self.open()?);
                *slot = Some(Arc::clone(&db));
                tracing::info!(database = %self.target, "Database handle cached");
                Ok(db)
            }
        }
    }

    /// The cached handle, if one has been opened
    pub fn cached(&self) -> Option<Arc<Database>> {
        match &self.policy {
            ConnectionPolicy::Cached(slot) => slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            ConnectionPolicy::AlwaysFresh => None,
        }
    }

    /// Open the target and run provision, views and lockdown on it
    pub fn open(&self) -> Result<Database> {
        tracing::info!(database = %self.target, mode = ?self.mode, "Opening database");

        let migrations = self.migrations.load()?;
        let conn = self.target.connect()?;
        migrations::provision(&conn, &migrations, &self.context, self.mode)?;
        migrations::lockdown(&conn, &migrations)?;

        tracing::debug!(database = %self.target, "Database provisioned and locked down");
        Ok(Database::new(conn))
    }
}
