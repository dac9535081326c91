//! Migration engine
//!
//! A connection becomes servable by running three SQL batches in a fixed
//! order:
//!
//! 1. **provision**: templated with the invoking user's home directory;
//!    attaches the Knowledge store.
//! 2. **views**: read-friendly views over the provisioned schema.
//! 3. **lockdown**: turns the connection read-only and stops it from
//!    reaching other files.
//!
//! The scripts ship inside the binary. A directory of replacement scripts
//! can be supplied instead; it is re-read on every open so edits show up on
//! the next connection.

use crate::db::Mode;
use crate::error::{Error, Result};
use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const PROVISION_SQL: &str = include_str!("sql/provision.sql");
const VIEWS_SQL: &str = include_str!("sql/views.sql");
const LOCKDOWN_SQL: &str = include_str!("sql/lockdown.sql");

/// Template key holding the home directory
pub const HOME_DIR_KEY: &str = "home_dir";

/// Pragmas a locked-down connection may read but not set
const GUARDED_PRAGMAS: &[&str] = &["query_only", "trusted_schema", "writable_schema"];

/// Position of a script in the migration sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Provision = 1,
    Views = 2,
    Lockdown = 3,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Provision, Stage::Views, Stage::Lockdown];

    /// 1-based execution position
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Stage name as used in logs and errors
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Provision => "provision",
            Stage::Views => "views",
            Stage::Lockdown => "lockdown",
        }
    }

    /// File name of the script inside a migrations directory
    pub fn file_name(self) -> &'static str {
        match self {
            Stage::Provision => "provision.sql",
            Stage::Views => "views.sql",
            Stage::Lockdown => "lockdown.sql",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SQL batch and its place in the sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    stage: Stage,
    sql: String,
}

impl MigrationScript {
    pub fn new(stage: Stage, sql: impl Into<String>) -> Self {
        Self {
            stage,
            sql: sql.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// The provision, views and lockdown scripts as a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSet {
    provision: MigrationScript,
    views: MigrationScript,
    lockdown: MigrationScript,
}

impl MigrationSet {
    /// Build a set from raw SQL bodies
    pub fn new(
        provision: impl Into<String>,
        views: impl Into<String>,
        lockdown: impl Into<String>,
    ) -> Self {
        Self {
            provision: MigrationScript::new(Stage::Provision, provision),
            views: MigrationScript::new(Stage::Views, views),
            lockdown: MigrationScript::new(Stage::Lockdown, lockdown),
        }
    }

    /// The scripts compiled into the binary
    pub fn embedded() -> Self {
        Self::new(PROVISION_SQL, VIEWS_SQL, LOCKDOWN_SQL)
    }

    /// Read `provision.sql`, `views.sql` and `lockdown.sql` from `dir`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let read = |stage: Stage| {
            let path = dir.join(stage.file_name());
            std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!(
                    "failed to read {} migration {}: {}",
                    stage,
                    path.display(),
                    e
                ))
            })
        };

        Ok(Self::new(
            read(Stage::Provision)?,
            read(Stage::Views)?,
            read(Stage::Lockdown)?,
        ))
    }

    pub fn provision(&self) -> &MigrationScript {
        &self.provision
    }

    pub fn views(&self) -> &MigrationScript {
        &self.views
    }

    pub fn lockdown(&self) -> &MigrationScript {
        &self.lockdown
    }

    /// Scripts in execution order
    pub fn scripts(&self) -> [&MigrationScript; 3] {
        [&self.provision, &self.views, &self.lockdown]
    }
}

/// Where the migration set comes from on each open
#[derive(Debug, Clone, Default)]
pub enum MigrationSource {
    /// Scripts compiled into the binary
    #[default]
    Embedded,
    /// Scripts read from a directory on every open
    Directory(PathBuf),
    /// A fixed, caller-supplied set
    Inline(MigrationSet),
}

impl MigrationSource {
    /// Resolve the set to run
    pub fn load(&self) -> Result<MigrationSet> {
        match self {
            MigrationSource::Embedded => Ok(MigrationSet::embedded()),
            MigrationSource::Directory(dir) => MigrationSet::load_dir(dir),
            MigrationSource::Inline(set) => Ok(set.clone()),
        }
    }
}

/// Values substituted into `{{key}}` placeholders of the provision script.
///
/// Values are stored in the form they are spliced into the SQL; [`render`]
/// additionally doubles single quotes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `value`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Bind the home directory, percent-encoding each path segment so the
    /// value can sit inside a SQLite `file:` URI
    pub fn with_home_dir(self, home: &Path) -> Self {
        let home = home.to_string_lossy();
        let encoded = home
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        self.with(HOME_DIR_KEY, encoded)
    }

    /// Context for the current process. The home directory is left unbound
    /// when it cannot be determined, which fails rendering later.
    pub fn from_environment() -> Self {
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir);

        match home {
            Some(home) => Self::new().with_home_dir(&home),
            None => {
                tracing::warn!("Could not determine home directory");
                Self::new()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Substitute every `{{key}}` placeholder in `template`
pub fn render(template: &str, context: &TemplateContext) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| Error::Template("unterminated placeholder".to_string()))?;
        let key = after[..end].trim();
        let value = context.get(key).ok_or_else(|| {
            Error::Template(format!("no value bound for placeholder {{{{{key}}}}}"))
        })?;
        out.push_str(&value.replace('\'', "''"));
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Run the provision and views stages.
///
/// A provision failure is fatal in production and only logged in
/// development, where the database is often already set up. Template and
/// views failures are always fatal. The views stage runs in a transaction.
pub fn provision(
    conn: &Connection,
    migrations: &MigrationSet,
    context: &TemplateContext,
    mode: Mode,
) -> Result<()> {
    let rendered = render(migrations.provision().sql(), context)?;

    tracing::debug!(stage = %Stage::Provision, "Running migration");
    if let Err(source) = conn.execute_batch(&rendered) {
        let err = Error::Migration {
            stage: Stage::Provision,
            source,
        };
        match mode {
            Mode::Production => return Err(err),
            Mode::Development => {
                tracing::warn!(error = %err, "Provision failed in development mode, continuing")
            }
        }
    }

    tracing::debug!(stage = %Stage::Views, "Running migration");
    let views_err = |source| Error::Migration {
        stage: Stage::Views,
        source,
    };
    let tx = conn.unchecked_transaction().map_err(views_err)?;
    tx.execute_batch(migrations.views().sql())
        .map_err(views_err)?;
    tx.commit().map_err(views_err)?;

    Ok(())
}

/// Run the lockdown stage and install an authorizer that keeps the
/// connection from attaching files or undoing the lockdown pragmas.
pub fn lockdown(conn: &Connection, migrations: &MigrationSet) -> Result<()> {
    tracing::debug!(stage = %Stage::Lockdown, "Running migration");
    conn.execute_batch(migrations.lockdown().sql())
        .map_err(Error::Lockdown)?;
    conn.authorizer(Some(deny_escapes));
    Ok(())
}

fn deny_escapes(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Attach { .. } | AuthAction::Detach { .. } => Authorization::Deny,
        AuthAction::Pragma {
            pragma_name,
            pragma_value: Some(_),
        } if GUARDED_PRAGMAS
            .iter()
            .any(|p| pragma_name.eq_ignore_ascii_case(p)) =>
        {
            Authorization::Deny
        }
        _ => Authorization::Allow,
    }
}
