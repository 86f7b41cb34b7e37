//! PostgreSQL wire-protocol backend
//!
//! Redshift cluster endpoints speak the PostgreSQL protocol, so the production
//! warehouse is reached through tokio-postgres. Statements go through the
//! simple query protocol: Redshift's `COPY` cannot be prepared, and each
//! simple query commits on its own.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::Type;

use super::{QueryResult, WarehouseBackend, WarehouseError, WarehouseResult, ensure_dialect};
use crate::config::WarehouseSection;
use crate::statement::{Dialect, Statement};

/// Warehouse backend over the PostgreSQL wire protocol
pub struct PostgresWarehouse {
    /// Endpoint description with the password left out
    endpoint: String,
    /// Client (None once closed)
    client: Mutex<Option<tokio_postgres::Client>>,
    /// Task driving the connection; joined on close
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresWarehouse {
    /// Connect to the warehouse endpoint described by the configuration
    pub async fn connect(section: &WarehouseSection) -> WarehouseResult<Self> {
        let host = section
            .host
            .as_deref()
            .ok_or_else(|| WarehouseError::ConfigError("warehouse.host is not set".to_string()))?;

        let mut config = tokio_postgres::Config::new();
        config
            .host(host)
            .port(section.port)
            .dbname(&section.db_name)
            .user(&section.user);
        if let Some(password) = &section.password {
            config.password(password);
        }

        let endpoint = format!(
            "{}@{}:{}/{}",
            section.user, host, section.port, section.db_name
        );

        let (client, connection) = config
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| {
                WarehouseError::ConnectionFailed(format!("Failed to connect to {}: {}", endpoint, e))
            })?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Warehouse connection error: {}", e);
            }
        });

        tracing::info!("Connected to warehouse {}", endpoint);

        Ok(Self {
            endpoint,
            client: Mutex::new(Some(client)),
            connection_task: Mutex::new(Some(connection_task)),
        })
    }

    /// One result row as a JSON object keyed by column name
    fn row_to_json(row: &tokio_postgres::Row, columns: &[String]) -> serde_json::Value {
        let map = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), column_to_json(row, i)))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Convert one column to JSON according to its declared type
///
/// Integer and float columns become numbers and text columns strings.
/// Types without a mapping here, such as `numeric`, come back as null, so
/// queries cast them to `bigint` or `varchar` first.
fn column_to_json(row: &tokio_postgres::Row, idx: usize) -> serde_json::Value {
    use serde_json::Value;

    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::from))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx).map(|v| v.map(Value::from))
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx).map(|v| v.map(Value::from))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map(|v| v.and_then(serde_json::Number::from_f64).map(Value::Number))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx).map(|v| {
            v.and_then(|f| serde_json::Number::from_f64(f64::from(f)))
                .map(Value::Number)
        })
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Bool))
    } else {
        row.try_get::<_, Option<String>>(idx).map(|v| v.map(Value::String))
    };

    value.ok().flatten().unwrap_or(Value::Null)
}

#[async_trait(?Send)]
impl WarehouseBackend for PostgresWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&self, statement: &Statement) -> WarehouseResult<u64> {
        ensure_dialect(statement, Dialect::Redshift)?;

        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| WarehouseError::ConnectionFailed("connection closed".to_string()))?;

        tracing::debug!(statement = %statement.label(), "{}", statement.sql);

        let messages = client.simple_query(&statement.sql).await.map_err(|e| {
            if e.is_closed() {
                WarehouseError::ConnectionFailed(e.to_string())
            } else {
                WarehouseError::StatementFailed {
                    label: statement.label(),
                    message: e.to_string(),
                }
            }
        })?;

        let affected = messages
            .iter()
            .filter_map(|m| match m {
                tokio_postgres::SimpleQueryMessage::CommandComplete(n) => Some(*n),
                _ => None,
            })
            .sum();

        Ok(affected)
    }

    async fn query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let start = std::time::Instant::now();

        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| WarehouseError::ConnectionFailed("connection closed".to_string()))?;

        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| WarehouseError::QueryFailed(e.to_string()))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let json_rows = rows
            .iter()
            .map(|row| Self::row_to_json(row, &columns))
            .collect();

        Ok(QueryResult {
            columns,
            rows: json_rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> WarehouseResult<bool> {
        let result = self.query("SELECT 1 AS ok").await?;
        Ok(result.scalar_i64() == Some(1))
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> WarehouseResult<()> {
        // Dropping the client ends the connection future
        let client = self.client.lock().await.take();
        drop(client);

        if let Some(task) = self.connection_task.lock().await.take() {
            task.await.map_err(|e| {
                WarehouseError::ConnectionFailed(format!("Connection task failed: {}", e))
            })?;
            tracing::info!("Closed warehouse connection {}", self.endpoint);
        }
        Ok(())
    }
}
