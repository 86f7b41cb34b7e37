//! DuckDB warehouse backend
//!
//! Embedded stand-in for the production warehouse. Statements are rendered in
//! [`Dialect::DuckDb`], which keeps relation and column names but drops the
//! Redshift placement hints.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use duckdb::types::ValueRef;

use super::{QueryResult, WarehouseBackend, WarehouseError, WarehouseResult, ensure_dialect};
use crate::statement::{Dialect, Statement};

/// DuckDB warehouse backend
///
/// Supports both file-based persistence and in-memory mode. The connection is
/// held in an `Option` so that [`WarehouseBackend::close`] can release it.
pub struct DuckDbWarehouse {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (None once closed)
    connection: Mutex<Option<duckdb::Connection>>,
}

impl DuckDbWarehouse {
    /// Open (or create) a file-based DuckDB warehouse
    pub fn open(db_path: impl AsRef<Path>) -> WarehouseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            WarehouseError::ConnectionFailed(format!(
                "Failed to open DuckDB at {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!("Opened DuckDB warehouse at {}", path.display());

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Create an in-memory DuckDB warehouse
    ///
    /// Everything is lost on close.
    pub fn in_memory() -> WarehouseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> WarehouseResult<MutexGuard<'_, Option<duckdb::Connection>>> {
        self.connection
            .lock()
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// One result row as a JSON object keyed by column name
    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
        let map = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row.get_ref(i).map(cell_to_json).unwrap_or_default();
                (name.clone(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Convert one cell to JSON
///
/// Warehouse relations only hold text, integers, doubles and
/// `NUMERIC(18,0)`. Integral decimals become numbers; other values keep
/// their debug rendering.
fn cell_to_json(value: ValueRef<'_>) -> serde_json::Value {
    use serde_json::Value;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => i64::try_from(i).map_or_else(|_| Value::String(i.to_string()), Value::from),
        ValueRef::Float(f) => float_to_json(f64::from(f)),
        ValueRef::Double(f) => float_to_json(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            text.parse::<i64>().map_or(Value::String(text), Value::from)
        }
        other => Value::String(format!("{:?}", other)),
    }
}

/// NaN and infinities have no JSON form
fn float_to_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

#[async_trait(?Send)]
impl WarehouseBackend for DuckDbWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64> {
        ensure_dialect(statement, Dialect::DuckDb)?;

        let guard = self.lock()?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| WarehouseError::ConnectionFailed("connection closed".to_string()))?;

        tracing::debug!(statement = %statement.label(), "{}", statement.sql);

        let changed = conn
            .execute(&statement.sql, [])
            .map_err(|e| WarehouseError::StatementFailed {
                label: statement.label(),
                message: e.to_string(),
            })?;

        Ok(changed as u64)
    }

    async fn query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let start = std::time::Instant::now();

        let guard = self.lock()?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| WarehouseError::ConnectionFailed("connection closed".to_string()))?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| WarehouseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // In DuckDB 1.4+, the query has to run before column names are known
        let mut result_rows = stmt
            .query([])
            .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| WarehouseError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            rows.push(Self::row_to_json(row, &columns));
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> WarehouseResult<bool> {
        let result = self.query("SELECT 1 AS ok").await?;
        Ok(result.scalar_i64() == Some(1))
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> WarehouseResult<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| {
                WarehouseError::ConnectionFailed(format!("Failed to close DuckDB: {}", e))
            })?;
            tracing::debug!("Closed DuckDB warehouse");
        }
        Ok(())
    }
}
