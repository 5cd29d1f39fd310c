//! Embedded SQLite relational adapter.
//!
//! Each namespace owns its own database file
//! (`<base>/relation/<namespace>/store.db`), which keeps cross-namespace
//! reads impossible by construction. Statements bind positional JSON
//! parameters; rows come back as JSON objects keyed by column name.

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Map, Number, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::traits::{ColumnSpec, DatabaseAdapter, QueryOutcome, RelationalStore};
use crate::types::{DbBackend, DbType};
use crate::{StoreConfig, StoreError, StoreResult};

const DATA_FILE: &str = "store.db";

/// SQLite-backed [`RelationalStore`].
pub struct SqliteRelationalAdapter {
    namespace: String,
    path: PathBuf,
    dir: PathBuf,
    connection: Mutex<Option<Connection>>,
}

impl SqliteRelationalAdapter {
    /// Creates an adapter for one namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>, config: &StoreConfig) -> Self {
        let namespace = namespace.into();
        let dir = config.namespace_path(DbType::Relation, &namespace);
        Self {
            namespace,
            path: dir.join(DATA_FILE),
            dir,
            connection: Mutex::new(None),
        }
    }

    fn not_connected(&self) -> StoreError {
        StoreError::NotConnected {
            db_type: DbType::Relation,
            namespace: self.namespace.clone(),
        }
    }

    fn backend_err(err: &rusqlite::Error) -> StoreError {
        StoreError::backend(format!("sqlite: {err}"))
    }

    fn run_statement(
        connection: &Connection,
        statement: &str,
        params: &[Value],
    ) -> StoreResult<QueryOutcome> {
        let mut prepared = connection
            .prepare(statement)
            .map_err(|err| Self::backend_err(&err))?;
        let columns: Vec<String> = prepared
            .column_names()
            .iter()
            .map(ToString::to_string)
            .collect();
        let bound = params.iter().map(to_sql_value).collect::<Vec<_>>();

        if columns.is_empty() {
            let affected = prepared
                .execute(rusqlite::params_from_iter(bound))
                .map_err(|err| Self::backend_err(&err))?;
            Ok(QueryOutcome::Affected(affected))
        } else {
            let mut rows = prepared
                .query(rusqlite::params_from_iter(bound))
                .map_err(|err| Self::backend_err(&err))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(|err| Self::backend_err(&err))? {
                let mut object = Map::new();
                for (index, column) in columns.iter().enumerate() {
                    let value = row
                        .get_ref(index)
                        .map_err(|err| Self::backend_err(&err))?;
                    object.insert(column.clone(), from_sql_value(value));
                }
                out.push(object);
            }
            Ok(QueryOutcome::Rows(out))
        }
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(flag) => Sql::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || Sql::Real(number.as_f64().unwrap_or(0.0)),
            Sql::Integer,
        ),
        Value::String(text) => Sql::Text(text.clone()),
        compound => Sql::Text(compound.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::from(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(_) => {
            warn!("blob column returned as null; blobs are not part of the facade contract");
            Value::Null
        }
    }
}

fn validate_identifier(identifier: &str) -> StoreResult<()> {
    let mut chars = identifier.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::invalid(format!(
            "invalid SQL identifier `{identifier}`"
        )))
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteRelationalAdapter {
    fn db_type(&self) -> DbType {
        DbType::Relation
    }

    fn backend(&self) -> DbBackend {
        DbBackend::Sqlite
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn connect(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let connection = Connection::open(&self.path)
            .map_err(|err| StoreError::unavailable(DbBackend::Sqlite, err.to_string()))?;
        *self.connection.lock().await = Some(connection);
        info!(namespace = %self.namespace, path = %self.path.display(), "sqlite adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        *self.connection.lock().await = None;
        info!(namespace = %self.namespace, "sqlite adapter disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }
}

#[async_trait]
impl RelationalStore for SqliteRelationalAdapter {
    async fn execute(&self, statement: &str, params: Vec<Value>) -> StoreResult<QueryOutcome> {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        Self::run_statement(connection, statement, &params)
    }

    async fn execute_batch(
        &self,
        statements: Vec<(String, Vec<Value>)>,
    ) -> StoreResult<Vec<QueryOutcome>> {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        let mut outcomes = Vec::with_capacity(statements.len());
        for (statement, params) in statements {
            outcomes.push(Self::run_statement(connection, &statement, &params)?);
        }
        Ok(outcomes)
    }

    async fn begin_transaction(&self) -> StoreResult<()> {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        connection
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|err| Self::backend_err(&err))
    }

    async fn commit_transaction(&self) -> StoreResult<()> {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        connection
            .execute_batch("COMMIT")
            .map_err(|err| Self::backend_err(&err))
    }

    async fn rollback_transaction(&self) -> StoreResult<()> {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        connection
            .execute_batch("ROLLBACK")
            .map_err(|err| Self::backend_err(&err))
    }

    async fn create_table(&self, table: &str, columns: Vec<ColumnSpec>) -> StoreResult<()> {
        validate_identifier(table)?;
        if columns.is_empty() {
            return Err(StoreError::invalid("a table needs at least one column"));
        }

        let mut definitions = Vec::with_capacity(columns.len());
        for column in &columns {
            validate_identifier(&column.name)?;
            let mut definition = format!("{} {}", column.name, column.sql_type);
            if let Some(constraints) = &column.constraints {
                definition.push(' ');
                definition.push_str(constraints);
            }
            definitions.push(definition);
        }
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} ({})",
            definitions.join(", ")
        );

        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        connection
            .execute_batch(&ddl)
            .map_err(|err| Self::backend_err(&err))
    }

    async fn drop_table(&self, table: &str) -> StoreResult<()> {
        validate_identifier(table)?;
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().ok_or_else(|| self.not_connected())?;
        connection
            .execute_batch(&format!("DROP TABLE IF EXISTS {table}"))
            .map_err(|err| Self::backend_err(&err))
    }
}
