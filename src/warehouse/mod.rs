//! Warehouse backend abstraction
//!
//! The pipeline talks to exactly one warehouse connection per run through the
//! [`WarehouseBackend`] trait. Two backends are provided:
//! - PostgreSQL wire protocol (a Redshift cluster endpoint)
//! - DuckDB: embedded database for local runs and tests
//!
//! Every statement is executed on its own and committed immediately; there is
//! no transaction spanning several statements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::statement::{Dialect, Statement};

pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbWarehouse;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresWarehouse;

/// Error type for warehouse operations
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Failed to reach or keep a connection to the warehouse
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A DDL/DML/COPY statement was rejected
    #[error("Statement '{label}' failed: {message}")]
    StatementFailed { label: String, message: String },

    /// A read-only query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Statement rendered for a different dialect than the backend speaks
    #[error("Dialect mismatch: statement is {statement}, backend is {backend}")]
    DialectMismatch { statement: Dialect, backend: Dialect },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

impl WarehouseError {
    /// True when the warehouse could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(self, WarehouseError::ConnectionFailed(_))
    }
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row as an integer
    ///
    /// Accepts numbers and numeric strings, since wide integer and decimal
    /// values may come back as strings. Fractional or out-of-range values
    /// give `None`.
    pub fn scalar_i64(&self) -> Option<i64> {
        let column = self.columns.first()?;
        let value = self.rows.first()?.get(column)?;
        match value {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
            serde_json::Value::String(s) => s
                .parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral)),
            _ => None,
        }
    }
}

/// `f` as an `i64` when it is a whole number inside the `i64` range
fn integral(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

/// Warehouse backend trait
///
/// Implementations own a single connection. Statements run one at a time and
/// are committed as soon as they succeed.
#[async_trait(?Send)]
pub trait WarehouseBackend: Send + Sync {
    /// SQL dialect this backend accepts
    fn dialect(&self) -> Dialect;

    /// Execute one DDL/DML/COPY statement
    ///
    /// # Returns
    /// Number of rows affected, when the warehouse reports it
    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64>;

    /// Execute a read-only SQL query and return its rows
    async fn query(&self, sql: &str) -> WarehouseResult<QueryResult>;

    /// Check if the warehouse is reachable
    async fn health_check(&self) -> WarehouseResult<bool>;

    /// Get the backend type name ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Close the connection
    ///
    /// Closing twice is a no-op. Any call after close fails with
    /// [`WarehouseError::ConnectionFailed`].
    async fn close(&self) -> WarehouseResult<()>;
}

/// Reject statements rendered for another dialect
pub(crate) fn ensure_dialect(statement: &Statement, backend: Dialect) -> WarehouseResult<()> {
    if statement.dialect != backend {
        return Err(WarehouseError::DialectMismatch {
            statement: statement.dialect,
            backend,
        });
    }
    Ok(())
}
