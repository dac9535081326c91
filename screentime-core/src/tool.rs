//! The `screentime_sql` tool
//!
//! Takes a raw SQL string, runs it against the managed connection and
//! returns the result as CSV. No validation happens here: the locked-down
//! connection is the security boundary.

use crate::db::{ConnectionManager, MigrationSet};
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Tool name advertised to MCP clients
pub const TOOL_NAME: &str = "screentime_sql";

const TOOL_DESCRIPTION: &str = include_str!("tool_description.md");

/// Arguments of a tool invocation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub sql: Option<String>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
        }
    }

    /// Extract the request from MCP tool-call arguments
    pub fn from_arguments(arguments: Value) -> Result<Self> {
        match arguments {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other)
                .map_err(|e| Error::InvalidRequest(format!("sql must be a string: {}", e))),
        }
    }
}

/// Runs SQL from tool calls
pub struct QueryTool {
    manager: Arc<ConnectionManager>,
}

impl QueryTool {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Run the request's SQL and return the result as CSV
    pub fn handle(&self, request: &QueryRequest) -> Result<String> {
        let sql = match request.sql.as_deref().map(str::trim) {
            Some(sql) if !sql.is_empty() => sql,
            _ => return Err(Error::InvalidRequest("sql must be set".to_string())),
        };

        let db = self
            .manager
            .get_connection()
            .map_err(|e| Error::NoDatabase(Box::new(e)))?;

        tracing::debug!(sql_len = sql.len(), "Running query");
        let csv = db.query(sql)?;
        tracing::debug!(bytes = csv.len(), "Query complete");
        Ok(csv)
    }

    /// Human-readable description: usage notes plus the view definitions
    pub fn description(&self) -> String {
        let views = MigrationSet::embedded();
        format!(
            "{}\n\n## Create Views Statements\n```sql\n{}\n```\n",
            TOOL_DESCRIPTION.trim_end(),
            views.views().sql().trim_end()
        )
    }

    /// JSON schema of the tool's arguments
    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": {
                    "type": "string",
                    "title": "SQL statement to query",
                    "description": "Queries the Screen Time database with the SQL statement."
                }
            },
            "required": ["sql"]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::HOME_DIR_KEY;
    use crate::db::{DatabaseTarget, MigrationSource, Mode, TemplateContext};

    fn tool(lockdown: &str) -> QueryTool {
        let migrations = MigrationSource::Inline(MigrationSet::new(
            "",
            "CREATE TEMP VIEW apps AS SELECT 'com.apple.Safari' AS bundle_id, 90 AS seconds;",
            lockdown,
        ));
        let manager = ConnectionManager::new(
            DatabaseTarget::InMemory,
            migrations,
            TemplateContext::new().with(HOME_DIR_KEY, "/Users/test"),
            Mode::Production,
        );
        QueryTool::new(Arc::new(manager))
    }

    fn working_tool() -> QueryTool {
        tool(MigrationSet::embedded().lockdown().sql())
    }

    #[test]
    fn test_select_one() {
        let out = working_tool()
            .handle(&QueryRequest::new("SELECT 1 AS n"))
            .unwrap();
        assert_eq!(out, "n\n1\n");
        assert_eq!(out.lines().collect::<Vec<_>>(), vec!["n", "1"]);
    }

    #[test]
    fn test_query_view() {
        let out = working_tool()
            .handle(&QueryRequest::new("SELECT bundle_id, seconds FROM apps"))
            .unwrap();
        assert_eq!(out, "bundle_id,seconds\ncom.apple.Safari,90\n");
    }

    #[test]
    fn test_empty_sql_touches_nothing() {
        let tool = working_tool();
        for request in [QueryRequest::default(), QueryRequest::new(""), QueryRequest::new("  \n")] {
            let err = tool.handle(&request).unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)));
        }
        assert!(tool.manager.cached().is_none());
    }

    #[test]
    fn test_no_database_after_failed_lockdown() {
        let tool = tool("NOT VALID SQL;");
        let err = tool.handle(&QueryRequest::new("SELECT 1")).unwrap_err();
        match err {
            Error::NoDatabase(inner) => assert!(matches!(*inner, Error::Lockdown(_))),
            other => panic!("expected NoDatabase, got {other:?}"),
        }
    }

    #[test]
    fn test_query_error_carries_engine_message() {
        let err = working_tool()
            .handle(&QueryRequest::new("SELECT * FROM nowhere"))
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
        assert!(err.to_string().contains("no such table: nowhere"));
    }

    #[test]
    fn test_writes_are_rejected() {
        let err = working_tool()
            .handle(&QueryRequest::new("CREATE TABLE t (x INTEGER)"))
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_from_arguments() {
        let request = QueryRequest::from_arguments(json!({ "sql": "SELECT 1" })).unwrap();
        assert_eq!(request.sql.as_deref(), Some("SELECT 1"));

        let request = QueryRequest::from_arguments(Value::Null).unwrap();
        assert!(request.sql.is_none());

        let err = QueryRequest::from_arguments(json!({ "sql": 7 })).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_description_lists_views() {
        let description = working_tool().description();
        assert!(description.contains("CREATE TEMP VIEW IF NOT EXISTS app_usage"));
        assert!(description.contains("```sql"));
    }
}
