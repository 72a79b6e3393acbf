//! Read-only SQL proxy over a SQLite database.
//!
//! The database is opened with `SQLITE_OPEN_READ_ONLY` and every ad-hoc statement must also
//! pass [`rusqlite::Statement::readonly`], so `INSERT`/`UPDATE`/`DELETE`/DDL are refused before
//! they run.

use crate::agentdesk::tool_protocol::{
    required_str, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol,
    ToolResult,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Map, Value as JsonValue};
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const GET_LIST_OF_TABLES: &str = "get_list_of_tables";
pub const GET_FIELDS_OF_TABLE: &str = "get_fields_of_table";
pub const EXECUTE_QUERY: &str = "execute_query";

/// Hard cap on rows returned by `execute_query`.
pub const MAX_ROWS: usize = 100;

pub struct SqlQueryProtocol {
    conn: Arc<Mutex<Connection>>,
}

impl SqlQueryProtocol {
    /// Open `path` read-only. The file must exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, Box<dyn Error + Send + Sync>>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ToolError::ExecutionFailed("database lock poisoned".into()))?;
            f(&guard).map_err(|e| ToolError::ExecutionFailed(format!("Database error: {}", e)))
        })
        .await?;
        Ok(joined?)
    }

    async fn list_tables(&self) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    /// Column names of `table`; `schema.table` selects an attached schema.
    async fn table_fields(&self, table: &str) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (schema.to_string(), table.to_string()),
            None => ("main".to_string(), table.to_string()),
        };
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
            let names = stmt
                .query_map(rusqlite::params![table, schema], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn run_query(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let query = query.to_string();
        let outcome = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                if !stmt.readonly() {
                    return Ok(None);
                }
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|c| c.to_string()).collect();
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    if out.len() >= limit {
                        break;
                    }
                    let mut object = Map::new();
                    for (i, column) in columns.iter().enumerate() {
                        object.insert(column.clone(), value_to_json(row.get_ref(i)?));
                    }
                    out.push(JsonValue::Object(object));
                }
                Ok(Some(out))
            })
            .await;

        Ok(match outcome {
            Ok(Some(rows)) => {
                let count = rows.len();
                ToolResult::success(JsonValue::Array(rows)).with_metadata("row_count", json!(count))
            }
            Ok(None) => ToolResult::failure(
                "execute_query is read-only: insert, update, delete and schema changes are not allowed"
                    .to_string(),
            ),
            Err(e) => ToolResult::failure(e.to_string()),
        })
    }
}

fn value_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => json!(BASE64.encode(b)),
    }
}

#[async_trait]
impl ToolProtocol for SqlQueryProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match tool_name {
            GET_LIST_OF_TABLES => Ok(match self.list_tables().await {
                Ok(tables) => ToolResult::success(json!(tables)),
                Err(e) => ToolResult::failure(e.to_string()),
            }),
            GET_FIELDS_OF_TABLE => {
                let table = required_str(&parameters, "table_name")?;
                Ok(match self.table_fields(table).await {
                    Ok(fields) => ToolResult::success(json!(fields)),
                    Err(e) => ToolResult::failure(e.to_string()),
                })
            }
            EXECUTE_QUERY => {
                let query = required_str(&parameters, "query")?;
                let limit = match parameters.get("limit") {
                    None | Some(JsonValue::Null) => MAX_ROWS,
                    Some(v) => v.as_u64().map(|n| n as usize).ok_or_else(|| {
                        ToolError::InvalidParameters("limit must be a positive integer".into())
                    })?,
                };
                self.run_query(query, limit.min(MAX_ROWS)).await
            }
            other => Err(Box::new(ToolError::NotFound(other.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![
            ToolMetadata::new(
                GET_LIST_OF_TABLES,
                "Get a list of all tables in the database.",
            ),
            ToolMetadata::new(
                GET_FIELDS_OF_TABLE,
                "Get the column names of a table. Use schema.table_name for attached schemas.",
            )
            .with_parameter(
                ToolParameter::new("table_name", ToolParameterType::String)
                    .with_description("Table name, e.g. 'events' or 'main.events'")
                    .required(),
            ),
            ToolMetadata::new(
                EXECUTE_QUERY,
                "Execute a read-only SQL query (no insert, update or delete). Returns at most 100 rows.",
            )
            .with_parameter(
                ToolParameter::new("query", ToolParameterType::String)
                    .with_description("A single SELECT statement")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("limit", ToolParameterType::Integer)
                    .with_description("Maximum rows to return (capped at 100)")
                    .with_default(json!(MAX_ROWS)),
            ),
        ])
    }

    fn protocol_name(&self) -> &str {
        "sqlite"
    }
}
