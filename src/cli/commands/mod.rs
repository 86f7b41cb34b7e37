//! CLI command implementations

pub mod pipeline;
pub mod provision;

use std::path::Path;

use crate::cli::error::CliError;
use crate::config::{PipelineConfig, WarehouseBackendType};
use crate::warehouse::WarehouseBackend;

/// Read the configuration file and apply environment overrides
pub fn load_config(path: &Path) -> Result<PipelineConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound(path.to_path_buf()));
    }
    PipelineConfig::load(path).map_err(|e| CliError::InvalidConfig(e.to_string()))
}

/// Runtime for one command
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Open the configured warehouse
pub async fn open_warehouse(
    config: &PipelineConfig,
) -> Result<Box<dyn WarehouseBackend>, CliError> {
    match config.warehouse.backend {
        WarehouseBackendType::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                let backend = crate::warehouse::DuckDbWarehouse::open(&config.warehouse.duckdb_path)?;
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                Err(CliError::FeatureDisabled(
                    "DuckDB backend not enabled. Build with --features duckdb-backend".to_string(),
                ))
            }
        }
        WarehouseBackendType::Redshift => {
            #[cfg(feature = "postgres-backend")]
            {
                let backend = crate::warehouse::PostgresWarehouse::connect(&config.warehouse).await?;
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(CliError::FeatureDisabled(
                    "PostgreSQL backend not enabled. Build with --features postgres-backend"
                        .to_string(),
                ))
            }
        }
    }
}
