//! CLI-specific error types

use crate::pipeline::PipelineError;
use crate::provision::ProvisionError;
use crate::warehouse::WarehouseError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Load failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(String),

    #[error("IO error: {0}")]
    IoError(String),
}
